//! Outbound command queue
//!
//! Commands are queued by application code (or by the driver itself) and sent one at a time on the
//! interrupt OUT pipe. Each entry is framed as `[length][payload]`. When a frame does not fit before
//! the physical end of the buffer, a [`WRAP`] marker is left in its place and the frame starts at offset 0.
//!
//! The queue is shared between two contexts: the producer (which calls [`CommandRing::enqueue`]) and the
//! completion context (which calls [`CommandRing::complete`]). Only the producer moves the write cursor,
//! only the consumer moves the read cursor. Which context may submit the next transfer is decided by an
//! atomic exchange on the in-flight flag.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use crate::host::Host;
use crate::types::PipeId;
use super::protocol::MAX_REPORT_LEN;
use defmt::{trace, warn, Format};

/// Length prefix marking the rest of the buffer as unused
pub const WRAP: u8 = 0xFF;

/// Error type for [`CommandRing::enqueue`]
#[derive(Copy, Clone, PartialEq, Debug, Format)]
pub enum RingError {
    /// Payload is longer than a report can be
    TooLong,
    /// The frame can never fit into a buffer of this capacity
    TooLarge,
    /// Not enough space right now (only returned by [`CommandRing::try_enqueue`])
    Full,
}

pub struct CommandRing<const N: usize> {
    buffer: UnsafeCell<[u8; N]>,
    /// Offset where the next frame (or wrap marker) will be written
    write: AtomicUsize,
    /// Offset of the oldest frame that was not yet sent completely
    read: AtomicUsize,
    /// A transfer was submitted and has not completed yet
    busy: AtomicBool,
}

// Safety: the buffer regions touched by producer and consumer are disjoint, and are handed over
// through the cursors with release/acquire ordering.
unsafe impl<const N: usize> Sync for CommandRing<N> {}

impl<const N: usize> Default for CommandRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CommandRing<N> {
    pub const fn new() -> Self {
        Self {
            buffer: UnsafeCell::new([0; N]),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
        }
    }

    /// Drop all queued frames, and clear the buffer
    pub fn reset(&mut self) {
        *self.buffer.get_mut() = [0; N];
        *self.write.get_mut() = 0;
        *self.read.get_mut() = 0;
        *self.busy.get_mut() = false;
    }

    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Is a transfer currently in flight?
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Number of unused bytes
    pub fn free(&self) -> usize {
        Self::free_from(self.write.load(Ordering::Acquire), self.read.load(Ordering::Acquire))
    }

    /// Number of bytes between the write cursor and the physical end of the buffer
    pub fn contiguous(&self) -> usize {
        N - self.write.load(Ordering::Acquire)
    }

    fn free_from(write: usize, read: usize) -> usize {
        if read > write {
            read - write
        } else {
            N - write + read
        }
    }

    /// Queue a frame, then try to send it.
    ///
    /// If there is not enough space, this spins until the completion context has drained enough frames.
    /// The stall is bounded as long as transfers keep completing, which requires completions to be delivered
    /// from a context that can preempt the caller. A caller that also delivers the completions must use
    /// [`try_enqueue`](Self::try_enqueue).
    pub fn enqueue<H: Host>(&self, payload: &[u8], pipe: PipeId, host: &mut H) -> Result<(), RingError> {
        self.push(payload, true)?;
        self.transmit(pipe, host);
        Ok(())
    }

    /// Like [`enqueue`](Self::enqueue), but returns [`RingError::Full`] instead of waiting for space.
    pub fn try_enqueue<H: Host>(&self, payload: &[u8], pipe: PipeId, host: &mut H) -> Result<(), RingError> {
        self.push(payload, false)?;
        self.transmit(pipe, host);
        Ok(())
    }

    fn push(&self, payload: &[u8], blocking: bool) -> Result<(), RingError> {
        let len = payload.len();
        if len > MAX_REPORT_LEN {
            return Err(RingError::TooLong)
        }
        let frame = len + 1;
        if 2 * frame > N {
            return Err(RingError::TooLarge)
        }

        let write = self.write.load(Ordering::Relaxed);
        let wrap = N - write < frame;
        let needed = if wrap { N - write + frame } else { frame };

        // the write cursor must never catch up with the read cursor, so strictly more than `needed` is required
        while Self::free_from(write, self.read.load(Ordering::Acquire)) <= needed {
            if !blocking {
                return Err(RingError::Full)
            }
            core::hint::spin_loop();
        }

        let buffer = self.buffer.get() as *mut u8;
        let start = if wrap {
            // Safety: `write < N`, and the space check above covers the bytes from `write` to the end.
            unsafe { buffer.add(write).write(WRAP) };
            0
        } else {
            write
        };
        // Safety: `start + frame <= N`, and the region is not visible to the consumer until the cursor is published.
        unsafe {
            buffer.add(start).write(len as u8);
            core::ptr::copy_nonoverlapping(payload.as_ptr(), buffer.add(start + 1), len);
        }

        let next = start + frame;
        self.write.store(if next == N { 0 } else { next }, Ordering::SeqCst);
        Ok(())
    }

    /// Submit the oldest queued frame, unless a transfer is already in flight.
    pub fn transmit<H: Host>(&self, pipe: PipeId, host: &mut H) {
        let read = loop {
            if self.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                return
            }
            let read = self.read.load(Ordering::Acquire);
            if read != self.write.load(Ordering::SeqCst) {
                break read
            }
            self.busy.store(false, Ordering::SeqCst);
            // a frame published between the check and the release would otherwise be stranded
            if read == self.write.load(Ordering::SeqCst) {
                return
            }
        };

        let buffer = self.buffer.get() as *const u8;
        // Safety: `read` points at the length prefix (or wrap marker) of a published frame.
        let (start, len) = match unsafe { buffer.add(read).read() } {
            WRAP => {
                self.read.store(0, Ordering::Release);
                (0, unsafe { buffer.read() } as usize)
            }
            len => (read, len as usize),
        };

        // Safety: the frame was published by the producer, and will not be overwritten before the read cursor moves past it.
        let frame = unsafe { core::slice::from_raw_parts(buffer.add(start + 1), len) };
        match host.interrupt_out(pipe, frame) {
            Ok(()) => trace!("command sent: {} bytes at offset {}", len, start),
            Err(error) => {
                warn!("failed to submit command: {}", error);
                self.busy.store(false, Ordering::SeqCst);
            }
        }
    }

    /// The transfer in flight has completed. Release its frame and send the next one.
    pub fn complete<H: Host>(&self, pipe: PipeId, host: &mut H) {
        if !self.busy.load(Ordering::Acquire) {
            return
        }
        let read = self.read.load(Ordering::Relaxed);
        // Safety: while busy, `read` is the offset of the frame in flight.
        let len = unsafe { (self.buffer.get() as *const u8).add(read).read() } as usize;
        let next = read + len + 1;
        self.read.store(if next >= N { 0 } else { next }, Ordering::Release);
        self.busy.store(false, Ordering::SeqCst);
        self.transmit(pipe, host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::intellikeys::mock::MockHost;

    const PIPE: PipeId = PipeId(5);

    fn drain<const N: usize>(ring: &CommandRing<N>, host: &mut MockHost) {
        while ring.is_busy() {
            ring.complete(PIPE, host);
        }
    }

    #[test]
    fn test_fifo_order() {
        let ring: CommandRing<135> = CommandRing::new();
        let mut host = MockHost::default();
        ring.enqueue(&[1, 2, 3], PIPE, &mut host).unwrap();
        ring.enqueue(&[4, 5], PIPE, &mut host).unwrap();
        ring.enqueue(&[6], PIPE, &mut host).unwrap();

        // only one transfer in flight
        assert_eq!(host.out.len(), 1);
        drain(&ring, &mut host);

        assert_eq!(host.out, vec![
            (PIPE, vec![1, 2, 3]),
            (PIPE, vec![4, 5]),
            (PIPE, vec![6]),
        ]);
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 135);
    }

    #[test]
    fn test_wraps_with_marker() {
        let ring: CommandRing<20> = CommandRing::new();
        let mut host = MockHost::default();
        ring.enqueue(&[1; 8], PIPE, &mut host).unwrap();
        ring.enqueue(&[2; 8], PIPE, &mut host).unwrap();
        drain(&ring, &mut host);
        assert_eq!(ring.contiguous(), 2);

        // does not fit into the remaining two bytes
        ring.enqueue(&[3; 8], PIPE, &mut host).unwrap();
        assert_eq!(unsafe { (*ring.buffer.get())[18] }, WRAP);
        assert_eq!(unsafe { (*ring.buffer.get())[0] }, 8);
        drain(&ring, &mut host);

        assert_eq!(host.out.len(), 3);
        assert_eq!(host.out[2].1, vec![3; 8]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_frame_ending_at_physical_end() {
        let ring: CommandRing<20> = CommandRing::new();
        let mut host = MockHost::default();
        ring.enqueue(&[1; 9], PIPE, &mut host).unwrap();
        ring.complete(PIPE, &mut host);
        ring.enqueue(&[2; 9], PIPE, &mut host).unwrap();
        assert_eq!(ring.contiguous(), 20);
        ring.complete(PIPE, &mut host);
        ring.enqueue(&[3; 2], PIPE, &mut host).unwrap();
        drain(&ring, &mut host);
        assert_eq!(host.out[1].1, vec![2; 9]);
        assert_eq!(host.out[2].1, vec![3; 2]);
    }

    #[test]
    fn test_try_enqueue_full() {
        let ring: CommandRing<20> = CommandRing::new();
        let mut host = MockHost::default();
        ring.try_enqueue(&[1; 8], PIPE, &mut host).unwrap();
        ring.try_enqueue(&[2; 8], PIPE, &mut host).unwrap();
        assert_eq!(ring.free(), 2);
        assert_eq!(ring.try_enqueue(&[3; 8], PIPE, &mut host), Err(RingError::Full));

        // the skipped tail counts, and the cursors must not meet
        ring.complete(PIPE, &mut host);
        assert_eq!(ring.free(), 11);
        assert_eq!(ring.try_enqueue(&[3; 8], PIPE, &mut host), Err(RingError::Full));

        ring.complete(PIPE, &mut host);
        assert_eq!(ring.try_enqueue(&[3; 8], PIPE, &mut host), Ok(()));
        assert_eq!(host.out.len(), 3);
    }

    #[test]
    fn test_rejects_oversized_payloads() {
        let ring: CommandRing<135> = CommandRing::new();
        let mut host = MockHost::default();
        assert_eq!(ring.enqueue(&[0; 65], PIPE, &mut host), Err(RingError::TooLong));
        let small: CommandRing<16> = CommandRing::new();
        assert_eq!(small.enqueue(&[0; 8], PIPE, &mut host), Err(RingError::TooLarge));
        assert!(host.out.is_empty());
    }

    #[test]
    fn test_refused_submission_stays_queued() {
        let ring: CommandRing<135> = CommandRing::new();
        let mut host = MockHost::default();
        host.refuse_out = true;
        ring.enqueue(&[7, 7], PIPE, &mut host).unwrap();
        assert!(host.out.is_empty());
        assert!(!ring.is_busy());

        host.refuse_out = false;
        ring.transmit(PIPE, &mut host);
        assert_eq!(host.out, vec![(PIPE, vec![7, 7])]);
    }

    #[test]
    fn test_many_frames_exactly_once() {
        let ring: CommandRing<30> = CommandRing::new();
        let mut host = MockHost::default();
        for i in 0..50u8 {
            let payload = [i; 5];
            ring.enqueue(&payload[..(i as usize % 5) + 1], PIPE, &mut host).unwrap();
            if i % 2 == 1 {
                drain(&ring, &mut host);
            }
        }
        drain(&ring, &mut host);
        assert_eq!(host.out.len(), 50);
        for (i, (_, data)) in host.out.iter().enumerate() {
            assert_eq!(data.len(), i % 5 + 1);
            assert!(data.iter().all(|byte| *byte == i as u8));
        }
    }

    #[test]
    fn test_reset() {
        let mut ring: CommandRing<135> = CommandRing::new();
        let mut host = MockHost::default();
        ring.enqueue(&[1, 2], PIPE, &mut host).unwrap();
        ring.reset();
        assert!(ring.is_empty());
        assert!(!ring.is_busy());
        assert_eq!(ring.contiguous(), 135);
    }
}
