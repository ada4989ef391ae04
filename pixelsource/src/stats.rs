//! Per-frame sample statistics.
use crate::descriptor::Padding;
use crate::layout::{DerivedLayout, SampleKind};

/// The range of sample values in a decoded frame,
/// excluding padding.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameStatistics {
    /// the frame the statistics were taken from
    pub frame: u32,
    pub min: f64,
    pub max: f64,
}

/// The sample values which are pixel padding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct PaddingFilter {
    low: i64,
    high: i64,
}

impl PaddingFilter {
    /// A padding range limit only applies
    /// if both ends are representable in the stored bits,
    /// otherwise only the padding value itself is excluded.
    pub(crate) fn new(padding: Option<&Padding>, layout: &DerivedLayout) -> Option<Self> {
        let padding = padding?;
        let value = i64::from(padding.value);
        let (min, max) = layout.stored_range();
        let in_range = |v: i64| v >= min && v <= max;
        match padding.range_limit.map(i64::from) {
            Some(limit) if in_range(value) && in_range(limit) => Some(PaddingFilter {
                low: value.min(limit),
                high: value.max(limit),
            }),
            _ => Some(PaddingFilter {
                low: value,
                high: value,
            }),
        }
    }

    #[inline]
    pub(crate) fn excludes(&self, value: i64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Min/max tracking over integer samples.
///
/// Only values up to `largest_gray` may raise the maximum;
/// if none qualifies, the maximum collapses to the minimum.
#[derive(Debug)]
pub(crate) struct IntAccumulator {
    min: i64,
    max: i64,
    seen: bool,
    max_seen: bool,
    padding: Option<PaddingFilter>,
    largest_gray: Option<i64>,
}

impl IntAccumulator {
    pub(crate) fn new(padding: Option<PaddingFilter>, largest_gray: Option<i64>) -> Self {
        IntAccumulator {
            min: i64::MAX,
            max: i64::MIN,
            seen: false,
            max_seen: false,
            padding,
            largest_gray,
        }
    }

    #[inline]
    pub(crate) fn update(&mut self, value: i64) {
        if matches!(self.padding, Some(p) if p.excludes(value)) {
            return;
        }
        self.seen = true;
        self.min = self.min.min(value);
        if self.largest_gray.map_or(true, |largest| value <= largest) {
            self.max_seen = true;
            self.max = self.max.max(value);
        }
    }

    pub(crate) fn finish(self, frame: u32) -> Option<FrameStatistics> {
        if !self.seen {
            return None;
        }
        let max = if self.max_seen { self.max } else { self.min };
        Some(FrameStatistics {
            frame,
            min: self.min as f64,
            max: max as f64,
        })
    }
}

/// Min/max tracking over floating point samples, ignoring NaN.
#[derive(Debug, Default)]
pub(crate) struct FloatAccumulator {
    range: Option<(f64, f64)>,
}

impl FloatAccumulator {
    #[inline]
    pub(crate) fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.range = Some(match self.range {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
    }

    pub(crate) fn finish(self, frame: u32) -> Option<FrameStatistics> {
        self.range.map(|(min, max)| FrameStatistics { frame, min, max })
    }
}

/// The statistics of the most recently decoded frame.
#[derive(Debug, Clone)]
pub struct Statistics {
    last: Option<FrameStatistics>,
    seed: (f64, f64),
}

impl Statistics {
    pub(crate) fn new(layout: &DerivedLayout) -> Self {
        let seed = match layout.sample_kind {
            Some(SampleKind::F32) => (f64::from(f32::MIN), f64::from(f32::MAX)),
            Some(SampleKind::F64) => (f64::MIN, f64::MAX),
            _ => {
                let (min, max) = layout.stored_range();
                (min as f64, max as f64)
            }
        };
        Statistics { last: None, seed }
    }

    /// The statistics of the last decoded frame,
    /// `None` before the first decode
    /// or if every sample of that frame was padding.
    pub fn current(&self) -> Option<&FrameStatistics> {
        self.last.as_ref()
    }

    pub fn minimum(&self) -> Option<f64> {
        self.last.map(|s| s.min)
    }

    pub fn maximum(&self) -> Option<f64> {
        self.last.map(|s| s.max)
    }

    /// The widest range of values the samples may take,
    /// for callers needing bounds before any frame is decoded.
    pub fn seed_range(&self) -> (f64, f64) {
        self.seed
    }

    pub(crate) fn update(&mut self, stats: Option<FrameStatistics>) {
        self.last = stats;
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ImageDescriptor, PhotometricInterpretation};
    use crate::layout::resolve;
    use rstest::rstest;

    fn layout(signed: bool) -> DerivedLayout {
        let d = ImageDescriptor::new(2, 2, 16, 12, 1, PhotometricInterpretation::Monochrome2)
            .with_signed(signed);
        resolve(&d).unwrap()
    }

    #[rstest]
    #[case(Padding::new(0), false, 0, 0)]
    #[case(Padding::with_range_limit(10, 2), false, 2, 10)]
    // the limit cannot be stored in 12 bits
    #[case(Padding::with_range_limit(10, 5000), false, 10, 10)]
    #[case(Padding::with_range_limit(-2000, -1024), true, -2000, -1024)]
    #[case(Padding::with_range_limit(-3000, -1024), true, -3000, -3000)]
    fn padding_ranges(
        #[case] padding: Padding,
        #[case] signed: bool,
        #[case] low: i64,
        #[case] high: i64,
    ) {
        let filter = PaddingFilter::new(Some(&padding), &layout(signed)).unwrap();
        assert_eq!(filter, PaddingFilter { low, high });
    }

    #[test]
    fn padding_is_excluded() {
        let padding = PaddingFilter::new(Some(&Padding::new(0)), &layout(false));
        let mut acc = IntAccumulator::new(padding, None);
        for v in [0, 7, 0, 0] {
            acc.update(v);
        }
        let stats = acc.finish(3).unwrap();
        assert_eq!(stats, FrameStatistics { frame: 3, min: 7., max: 7. });

        let mut acc = IntAccumulator::new(padding, None);
        acc.update(0);
        assert_eq!(acc.finish(0), None);
    }

    #[test]
    fn largest_gray_bounds_the_maximum() {
        let mut acc = IntAccumulator::new(None, Some(100));
        for v in [5, 150, 90, 255] {
            acc.update(v);
        }
        assert_eq!(acc.finish(0).map(|s| (s.min, s.max)), Some((5., 90.)));

        // nothing at or below the largest gray value
        let mut acc = IntAccumulator::new(None, Some(100));
        for v in [200, 150] {
            acc.update(v);
        }
        assert_eq!(acc.finish(0).map(|s| (s.min, s.max)), Some((150., 150.)));
    }

    #[test]
    fn float_statistics_ignore_nan() {
        let mut acc = FloatAccumulator::default();
        for v in [f64::NAN, 0.5, -1.5, f64::NAN, 3.25] {
            acc.update(v);
        }
        assert_eq!(acc.finish(1).map(|s| (s.min, s.max)), Some((-1.5, 3.25)));
        assert_eq!(FloatAccumulator::default().finish(0), None);
    }

    #[test]
    fn statistics_start_unset() {
        let mut stats = Statistics::new(&layout(true));
        assert_eq!(stats.minimum(), None);
        assert_eq!(stats.maximum(), None);
        assert_eq!(stats.seed_range(), (-2048., 2047.));

        stats.update(Some(FrameStatistics {
            frame: 0,
            min: -3.,
            max: 9.,
        }));
        assert_eq!(stats.minimum(), Some(-3.));
        assert_eq!(stats.maximum(), Some(9.));
        stats.reset();
        assert!(stats.current().is_none());
    }
}
