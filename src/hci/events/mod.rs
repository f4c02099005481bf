use crate::hci::buffer::ReceiveBuffer;
use crate::hci::Error;

/// Decoder for the return parameters that follow the status byte.
pub trait FromEvent: Sized {
    fn unpack(buf: &mut ReceiveBuffer) -> Result<Self, Error>;
}

impl FromEvent for () {
    fn unpack(_: &mut ReceiveBuffer) -> Result<Self, Error> {
        Ok(())
    }
}

impl FromEvent for u8 {
    fn unpack(buf: &mut ReceiveBuffer) -> Result<Self, Error> {
        buf.u8()
    }
}

impl FromEvent for u16 {
    fn unpack(buf: &mut ReceiveBuffer) -> Result<Self, Error> {
        buf.u16()
    }
}

impl<A: FromEvent, B: FromEvent> FromEvent for (A, B) {
    fn unpack(buf: &mut ReceiveBuffer) -> Result<Self, Error> {
        Ok((A::unpack(buf)?, B::unpack(buf)?))
    }
}
