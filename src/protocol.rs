// Send/receive state machine shared by the decode and encode engines.
//
// The native protocol is stateful and bounded: a codec may hold several inputs
// before emitting output, and a send can fail while its internal queue is full.
// A failed send is answered by draining one unit first, never by erroring.

use crate::native::{NativeError, NativeUnit};

/// Where a unit-to-unit stream adapter is in its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Feeding,
    Draining,
    Done,
}

/// One protocol step: send `input` (or the end marker), then try to take one unit out.
///
/// `scratch` is the engine's reusable buffer. It is unreferenced before every
/// receive and only clones of it leave this function.
pub(crate) fn exchange<C, I, O>(
    context: &mut C,
    scratch: &mut O,
    input: Option<&I>,
    send: fn(&mut C, Option<&I>) -> Result<(), NativeError>,
    receive: fn(&mut C, &mut O) -> Result<(), NativeError>,
) -> Result<Option<O>, NativeError>
where
    O: NativeUnit,
{
    if let Err(err) = send(context, input) {
        if !err.is_eof() {
            // Codec may be full; drain before giving up on the send
            if let Some(unit) = drain_one(context, scratch, receive)? {
                return Ok(Some(unit));
            }
            if !err.is_again() {
                return Err(err);
            }
        }
    }

    drain_one(context, scratch, receive)
}

/// Receive at most one unit. "Try again" and "end of stream" mean nothing is ready.
pub(crate) fn drain_one<C, O>(
    context: &mut C,
    scratch: &mut O,
    receive: fn(&mut C, &mut O) -> Result<(), NativeError>,
) -> Result<Option<O>, NativeError>
where
    O: NativeUnit,
{
    scratch.unref();
    match receive(context, scratch) {
        Ok(()) => scratch.try_clone().map(Some),
        Err(NativeError::Again) | Err(NativeError::Eof) => Ok(None),
        Err(err) => Err(err),
    }
}
