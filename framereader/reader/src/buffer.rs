/*!
    Presentation-ordered frame buffer.
*/

use std::collections::VecDeque;

use crate::frame::Frame;

/**
    Frames kept sorted by timestamp, bounded by a capacity.

    The buffer does not enforce the capacity on insert; the stream decides
    whether to stop decoding or evict when it is full.
*/
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn front(&self) -> Option<&Frame> {
        self.frames.front()
    }

    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /**
        Insert in timestamp order. A frame whose timestamp is already
        buffered is handed back.
    */
    pub fn insert(&mut self, frame: Frame) -> Option<Frame> {
        let timestamp = frame.timestamp();
        let index = self.frames.partition_point(|f| f.timestamp() < timestamp);
        if self
            .frames
            .get(index)
            .is_some_and(|f| f.timestamp() == timestamp)
        {
            return Some(frame);
        }
        self.frames.insert(index, frame);
        None
    }

    /**
        Returns true if `timestamp` lies between the first and last buffered
        frames, inclusive.
    */
    pub fn covers(&self, timestamp: i64) -> bool {
        match (self.frames.front(), self.frames.back()) {
            (Some(first), Some(last)) => {
                first.timestamp() <= timestamp && timestamp <= last.timestamp()
            }
            _ => false,
        }
    }

    /**
        Drop every frame earlier than `timestamp`, returning how many went.
    */
    pub fn discard_before(&mut self, timestamp: i64) -> usize {
        let count = self.frames.partition_point(|f| f.timestamp() < timestamp);
        self.frames.drain(..count);
        count
    }

    /**
        Drop every frame, returning how many went.
    */
    pub fn clear(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::HostPicture;
    use framereader_types::PixelFormat;

    fn frame(n: i64) -> Frame {
        Frame::new(
            Box::new(HostPicture::new(PixelFormat::Rgb24, 2, 2)),
            n * 40_000,
            n,
        )
    }

    fn numbers(buffer: &FrameBuffer) -> Vec<i64> {
        buffer.frames.iter().map(Frame::frame_number).collect()
    }

    #[test]
    fn insert_sorts_by_timestamp() {
        let mut buffer = FrameBuffer::new(4);
        for n in [0, 3, 1, 2] {
            assert!(buffer.insert(frame(n)).is_none());
        }
        assert_eq!(numbers(&buffer), vec![0, 1, 2, 3]);
        assert!(buffer.is_full());
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut buffer = FrameBuffer::new(4);
        buffer.insert(frame(1));
        let rejected = buffer.insert(frame(1));
        assert_eq!(rejected.map(|f| f.frame_number()), Some(1));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn covers_and_discard() {
        let mut buffer = FrameBuffer::new(8);
        for n in 2..6 {
            buffer.insert(frame(n));
        }
        assert!(buffer.covers(80_000));
        assert!(buffer.covers(130_000));
        assert!(buffer.covers(200_000));
        assert!(!buffer.covers(79_999));
        assert!(!buffer.covers(200_001));

        assert_eq!(buffer.discard_before(130_000), 2);
        assert_eq!(numbers(&buffer), vec![4, 5]);
        assert_eq!(buffer.clear(), 2);
        assert!(!buffer.covers(160_000));
    }
}
