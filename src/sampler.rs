use crate::config::SampleResolution;
use image::RgbImage;

/// Flat RGBA pixels at the sample resolution, row-major, alpha always 255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledFrame {
    resolution: SampleResolution,
    rgba: Vec<u8>,
}

impl SampledFrame {
    /// An opaque black frame
    pub fn new(resolution: SampleResolution) -> Self {
        let mut rgba = vec![0u8; resolution.count() * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self { resolution, rgba }
    }

    /// Wrap an existing RGBA buffer. Returns `None` on a length mismatch.
    pub fn from_rgba(resolution: SampleResolution, rgba: Vec<u8>) -> Option<Self> {
        (rgba.len() == resolution.count() * 4).then_some(Self { resolution, rgba })
    }

    pub fn resolution(&self) -> SampleResolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    pub fn pixel(&self, index: usize) -> [u8; 4] {
        let i = index * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    /// Overwrite this frame with another of the same resolution, in place
    pub fn copy_from(&mut self, other: &SampledFrame) {
        self.rgba.copy_from_slice(&other.rgba);
    }
}

/// Draws video frames into a fixed-size off-screen pixel buffer.
///
/// Scaling is nearest-neighbour at pixel centres. The source-to-sample
/// lookup tables are rebuilt only when the source dimensions change, so
/// steady-state sampling does not allocate.
pub struct PixelSampler {
    frame: SampledFrame,
    source_dims: (u32, u32),
    x_lookup: Vec<usize>,
    y_lookup: Vec<usize>,
}

impl PixelSampler {
    pub fn new(resolution: SampleResolution) -> Self {
        Self {
            frame: SampledFrame::new(resolution),
            source_dims: (0, 0),
            x_lookup: Vec::with_capacity(resolution.width() as usize),
            y_lookup: Vec::with_capacity(resolution.height() as usize),
        }
    }

    pub fn resolution(&self) -> SampleResolution {
        self.frame.resolution()
    }

    /// The most recently sampled frame
    pub fn frame(&self) -> &SampledFrame {
        &self.frame
    }

    /// Scale `source` into the sample buffer.
    ///
    /// Returns `false` without touching the buffer when the source has no
    /// pixels yet.
    pub fn sample(&mut self, source: &RgbImage) -> bool {
        let (src_w, src_h) = source.dimensions();
        if src_w == 0 || src_h == 0 {
            return false;
        }

        let _span = tracing::debug_span!("sample").entered();

        if self.source_dims != (src_w, src_h) {
            tracing::debug!(
                "Rebuilding sample lookup for {}x{} -> {}",
                src_w,
                src_h,
                self.frame.resolution
            );
            self.source_dims = (src_w, src_h);
            let res = self.frame.resolution;
            rebuild_lookup(&mut self.x_lookup, res.width(), src_w);
            rebuild_lookup(&mut self.y_lookup, res.height(), src_h);
        }

        let width = self.frame.resolution.width() as usize;
        let stride = src_w as usize * 3;
        let src = source.as_raw();

        for (y, &sy) in self.y_lookup.iter().enumerate() {
            let row = &src[sy * stride..(sy + 1) * stride];
            let out_row = &mut self.frame.rgba[y * width * 4..(y + 1) * width * 4];
            for (px, &sx) in out_row.chunks_exact_mut(4).zip(&self.x_lookup) {
                let s = sx * 3;
                px[0] = row[s];
                px[1] = row[s + 1];
                px[2] = row[s + 2];
                px[3] = 255;
            }
        }

        true
    }
}

/// Map each destination coordinate to the source pixel under its centre
fn rebuild_lookup(lookup: &mut Vec<usize>, dst: u32, src: u32) {
    let (dst, src) = (dst as u64, src as u64);
    lookup.clear();
    lookup.extend((0..dst).map(|d| (((2 * d + 1) * src) / (2 * dst)) as usize));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn res(w: u32, h: u32) -> SampleResolution {
        SampleResolution::new(w, h).unwrap()
    }

    #[test]
    fn new_frame_is_opaque_black() {
        let frame = SampledFrame::new(res(2, 2));
        assert_eq!(frame.as_bytes().len(), 16);
        assert_eq!(frame.pixel(3), [0, 0, 0, 255]);
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(SampledFrame::from_rgba(res(2, 2), vec![0; 15]).is_none());
        assert!(SampledFrame::from_rgba(res(2, 2), vec![0; 16]).is_some());
    }

    #[test]
    fn same_size_copies_pixels() {
        let src = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 7]));
        let mut sampler = PixelSampler::new(res(3, 2));
        assert!(sampler.sample(&src));
        assert_eq!(sampler.frame().pixel(0), [0, 0, 7, 255]);
        assert_eq!(sampler.frame().pixel(2), [20, 0, 7, 255]);
        assert_eq!(sampler.frame().pixel(4), [10, 10, 7, 255]);
    }

    #[test]
    fn downscale_picks_pixel_centres() {
        // 8x8 source where every pixel encodes its own coordinates
        let src = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8, y as u8, 0]));
        let mut sampler = PixelSampler::new(res(4, 2));
        assert!(sampler.sample(&src));

        // Destination x centres land on source columns 1, 3, 5, 7
        let xs: Vec<u8> = (0..4).map(|i| sampler.frame().pixel(i)[0]).collect();
        assert_eq!(xs, vec![1, 3, 5, 7]);
        // Destination y centres land on source rows 2 and 6
        assert_eq!(sampler.frame().pixel(0)[1], 2);
        assert_eq!(sampler.frame().pixel(4)[1], 6);
    }

    #[test]
    fn upscale_repeats_pixels() {
        let src = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8 * 100, 0, 0]));
        let mut sampler = PixelSampler::new(res(4, 2));
        assert!(sampler.sample(&src));
        let row: Vec<u8> = (0..4).map(|i| sampler.frame().pixel(i)[0]).collect();
        assert_eq!(row, vec![0, 0, 100, 100]);
    }

    #[test]
    fn empty_source_is_skipped() {
        let mut sampler = PixelSampler::new(res(2, 2));
        let before = sampler.frame().clone();
        assert!(!sampler.sample(&RgbImage::new(0, 0)));
        assert_eq!(sampler.frame(), &before);
    }

    #[test]
    fn source_size_change_rebuilds_lookup() {
        let mut sampler = PixelSampler::new(res(2, 2));
        sampler.sample(&RgbImage::from_pixel(4, 4, Rgb([1, 1, 1])));
        assert!(sampler.sample(&RgbImage::from_pixel(2, 6, Rgb([9, 9, 9]))));
        assert_eq!(sampler.frame().pixel(3), [9, 9, 9, 255]);
    }
}
