use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

/// A pixel buffer leased from a [`FramePool`].
///
/// The underlying allocation is returned to the pool when the lease is
/// dropped, so steady-state operation performs no per-frame allocation.
pub struct FrameBuf {
    data: Vec<u8>,
    home: Sender<Vec<u8>>,
}

impl FrameBuf {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        // If the pool is gone we are shutting down and the buffer just frees.
        let _ = self.home.try_send(data);
    }
}

impl std::fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameBuf({} bytes)", self.data.len())
    }
}

/// Fixed-slot pool of pixel buffers.
///
/// The slot count bounds total frame memory: queue capacity plus one slot per
/// worker that can hold a frame concurrently.
pub struct FramePool {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    buf_len: usize,
}

impl FramePool {
    pub fn new(slots: usize, buf_len: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(slots);
        for _ in 0..slots {
            tx.send(vec![0u8; buf_len]).expect("pool sized for slots");
        }
        Self { tx, rx, buf_len }
    }

    /// Lease a buffer, or `None` when every slot is in flight.
    pub fn take(&self) -> Option<FrameBuf> {
        let mut data = self.rx.try_recv().ok()?;
        data.resize(self.buf_len, 0);
        Some(FrameBuf {
            data,
            home: self.tx.clone(),
        })
    }

    pub fn available(&self) -> usize {
        self.rx.len()
    }
}

/// One captured video frame: an owned BGR8 buffer plus capture metadata.
///
/// `seq` is assigned at capture and is strictly increasing within one capture
/// session. No frame crosses a stage boundary by reference; each stage owns
/// the frame it holds.
pub struct RawFrame {
    pub seq: u64,
    pub stamp: Instant,
    width: u32,
    height: u32,
    stride: usize,
    buf: FrameBuf,
}

impl RawFrame {
    /// Wrap a leased buffer. The buffer length must be exactly
    /// `height * stride` with `stride == width * 3`.
    pub fn new(seq: u64, stamp: Instant, width: u32, height: u32, buf: FrameBuf) -> Self {
        let stride = width as usize * 3;
        assert_eq!(buf.len(), height as usize * stride);
        Self {
            seq,
            stamp,
            width,
            height,
            stride,
            buf,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_slots_are_recycled() {
        let pool = FramePool::new(2, 12);
        assert_eq!(pool.available(), 2);
        let a = pool.take().unwrap();
        let b = pool.take().unwrap();
        assert!(pool.take().is_none());
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn frame_geometry() {
        let pool = FramePool::new(1, 4 * 2 * 3);
        let frame = RawFrame::new(7, Instant::now(), 4, 2, pool.take().unwrap());
        assert_eq!(frame.seq, 7);
        assert_eq!(frame.stride(), 12);
        assert_eq!(frame.data().len(), 24);
    }
}
