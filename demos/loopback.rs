use std::time::Duration;

use anyhow::Context;
use tokio::spawn;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use bluefang_hci::hci::{HciBuilder, Opcode, OpcodeGroup};
use bluefang_hci::hci::consts::{EventCode, EventMask, Lap, Status};
use bluefang_hci::host::channel::{channel_transport, ControllerEnd};

/// Answers commands the way a freshly powered controller would.
async fn simulated_controller(mut controller: ControllerEnd) {
    let inquiry = Opcode::new(OpcodeGroup::LinkControl, 0x0001);
    let read_local_version = Opcode::new(OpcodeGroup::InfoParams, 0x0001);
    let read_bd_addr = Opcode::new(OpcodeGroup::InfoParams, 0x0009);

    while let Some(cmd) = controller.next_command().await {
        let result = match cmd.opcode {
            op if op == inquiry => {
                controller
                    .command_status(Status::Success, 1, op)
                    .and_then(|_| controller.send_event(EventCode::InquiryComplete, &[Status::Success.into()]))
            }
            op if op == read_local_version => controller.command_complete(1, op, &[0x00, 0x0C, 0x00, 0x00, 0x0C, 0x5D, 0x00, 0x00, 0x00]),
            op if op == read_bd_addr => controller.command_complete(1, op, &[0x00, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]),
            op => controller.command_complete(1, op, &[Status::Success.into()])
        };
        if let Err(err) = result {
            warn!("Simulated controller stopped: {}", err);
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(layer().without_time())
        .with(EnvFilter::from_default_env())
        .init();

    let (transport, controller) = channel_transport();
    spawn(simulated_controller(controller));

    let hci = HciBuilder::default()
        .with_command_timeout(Duration::from_millis(500))
        .spawn(transport)
        .await
        .context("failed to start the HCI session")?;

    info!("HCI version: {:?}", hci.read_local_version().await?);
    info!("Local BD_ADDR: {}", hci.read_bd_addr().await?);

    hci.set_event_mask(EventMask::all()).await?;
    hci.write_local_name("bluefang").await?;
    hci.set_scan_enabled(true, true).await?;

    let (tx, mut events) = unbounded_channel();
    hci.register_event_handler([EventCode::InquiryComplete], tx)?;
    hci.inquiry(Lap::GENERAL, 4, 0).await?;

    tokio::select! {
        event = events.recv() => info!("Inquiry finished: {:?}", event.context("event loop closed")?.data),
        _ = sleep(Duration::from_secs(10)) => warn!("Inquiry did not finish"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    hci.shutdown().await?;
    Ok(())
}
