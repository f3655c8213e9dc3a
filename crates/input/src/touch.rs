use glam::Vec2;
use std::collections::BTreeMap;

/// A camera gesture recognised from active touches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchGesture {
    /// One finger dragged by `delta` pixels.
    Rotate { delta: Vec2 },
    /// Two fingers: `scale` is the ratio of new to old finger distance,
    /// `pan` the motion of their midpoint in pixels.
    DollyPan { scale: f32, pan: Vec2 },
}

/// Tracks touch points by id and turns their motion into gestures.
#[derive(Debug, Default, Clone)]
pub struct TouchTracker {
    touches: BTreeMap<u64, Vec2>,
    pinch: Option<(f32, Vec2)>,
}

impl TouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.touches.len()
    }

    pub fn start(&mut self, id: u64, position: Vec2) {
        self.touches.insert(id, position);
        self.pinch = self.pinch_state();
    }

    pub fn moved(&mut self, id: u64, position: Vec2) -> Option<TouchGesture> {
        let previous = self.touches.get_mut(&id)?;
        let delta = position - *previous;
        *previous = position;

        match self.touches.len() {
            1 => Some(TouchGesture::Rotate { delta }),
            2 => {
                let (start_distance, start_mid) = self.pinch?;
                let (distance, mid) = self.pinch_state()?;
                self.pinch = Some((distance, mid));
                let scale = if start_distance > f32::EPSILON {
                    distance / start_distance
                } else {
                    1.0
                };
                Some(TouchGesture::DollyPan {
                    scale,
                    pan: mid - start_mid,
                })
            }
            _ => None,
        }
    }

    pub fn end(&mut self, id: u64) {
        self.touches.remove(&id);
        self.pinch = self.pinch_state();
    }

    pub fn clear(&mut self) {
        self.touches.clear();
        self.pinch = None;
    }

    /// Finger distance and midpoint when exactly two touches are down.
    fn pinch_state(&self) -> Option<(f32, Vec2)> {
        let mut points = self.touches.values();
        match (points.next(), points.next(), points.next()) {
            (Some(a), Some(b), None) => Some((a.distance(*b), (*a + *b) * 0.5)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_finger_rotates() {
        let mut t = TouchTracker::new();
        t.start(1, Vec2::new(10.0, 10.0));
        let g = t.moved(1, Vec2::new(15.0, 8.0)).unwrap();
        assert_eq!(
            g,
            TouchGesture::Rotate {
                delta: Vec2::new(5.0, -2.0)
            }
        );
    }

    #[test]
    fn two_fingers_pinch_and_pan() {
        let mut t = TouchTracker::new();
        t.start(1, Vec2::new(0.0, 0.0));
        t.start(2, Vec2::new(100.0, 0.0));

        let g = t.moved(2, Vec2::new(200.0, 0.0)).unwrap();
        match g {
            TouchGesture::DollyPan { scale, pan } => {
                assert!((scale - 2.0).abs() < 1e-6);
                assert_eq!(pan, Vec2::new(50.0, 0.0));
            }
            other => panic!("unexpected {other:?}"),
        }

        // Baseline moved with the gesture.
        let g = t.moved(1, Vec2::new(0.0, 0.0)).unwrap();
        assert_eq!(
            g,
            TouchGesture::DollyPan {
                scale: 1.0,
                pan: Vec2::ZERO
            }
        );
    }

    #[test]
    fn lifting_a_finger_returns_to_rotate() {
        let mut t = TouchTracker::new();
        t.start(1, Vec2::ZERO);
        t.start(2, Vec2::X);
        t.end(2);
        assert_eq!(t.active(), 1);
        assert!(matches!(
            t.moved(1, Vec2::ONE),
            Some(TouchGesture::Rotate { .. })
        ));
        assert!(t.moved(7, Vec2::ONE).is_none(), "unknown touch id");
    }
}
