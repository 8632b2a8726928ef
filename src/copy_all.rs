//! Bounded source-to-sink copying.

use crate::{error::Status, reader::Reader, writer::Writer};

#[cold]
fn max_length_exceeded(max_length: u64) -> Status {
    Status::resource_exhausted(std::format!("maximum length exceeded: {max_length}"))
}

fn failed(src: &impl Reader, dest: &impl Writer) -> Status {
    // The destination's failure takes precedence over the source's.
    dest.status()
        .or_else(|| src.status())
        .unwrap_or_else(|| Status::internal("copy failed with both sides ok"))
}

/// Copies everything from `src` to `dest`, up to `max_length` bytes.
///
/// When the copy would exceed `max_length`, exactly `max_length` bytes are
/// copied and `ResourceExhausted` is returned. A failed side's status is
/// returned otherwise, the destination taking precedence.
pub fn copy_all<R: Reader, W: Writer>(
    src: &mut R,
    dest: &mut W,
    max_length: u64,
) -> Result<(), Status> {
    if src.supports_size() {
        let Some(size) = src.size() else {
            return Err(src
                .status()
                .unwrap_or_else(|| Status::internal("size unavailable")));
        };
        let remaining = size.saturating_sub(src.pos());
        if remaining > max_length {
            dest.set_size_hint(Some(max_length));
            if !src.copy_to(max_length, dest) {
                return Err(failed(src, dest));
            }
            return Err(max_length_exceeded(max_length));
        }
        dest.set_size_hint(Some(remaining));
        if !src.copy_to(remaining, dest) {
            return Err(failed(src, dest));
        }
        Ok(())
    } else {
        let mut remaining_max_length = max_length;
        loop {
            let available = src.available() as u64;
            if available > remaining_max_length {
                if !src.copy_to(remaining_max_length, dest) {
                    return Err(failed(src, dest));
                }
                return Err(max_length_exceeded(max_length));
            }
            remaining_max_length -= available;
            if available > 0 && !src.copy_to(available, dest) {
                return Err(failed(src, dest));
            }
            if !src.pull(1, remaining_max_length.min(usize::MAX as u64) as usize) {
                break;
            }
        }
        if let Some(status) = src.status() {
            return Err(status);
        }
        Ok(())
    }
}
