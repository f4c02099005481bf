//! Command layer of a Bluetooth HCI host.
//!
//! [`hci::Hci`] turns "execute command X" into "write the command packet to the
//! [`host::Transport`], wait for the matching Command Complete or Command Status
//! event, and hand back its return parameters", while honoring the controller's
//! `Num_HCI_Command_Packets` credits and reusing pooled command buffers.

pub mod hci;
pub mod host;
mod utils;
