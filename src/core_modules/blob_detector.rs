// THEORY:
// The `MaskDetector` is a reference detection source. Given a binary foreground
// mask (computed upstream by whatever background model the deployment uses) it
// finds connected regions and packages each one as a `Detection`.
//
// Algorithm steps:
// 1.  **Scan**: Walk the mask row by row looking for unvisited foreground
//     pixels (value above `threshold`). Each one seeds a new region.
// 2.  **Region Growing**: From the seed, an iterative flood fill collects every
//     8-connected foreground pixel, marking each as visited so no pixel lands
//     in two regions.
// 3.  **Aggregation**: The region's extents become its bounding box, its pixel
//     count its area, and the box center its centroid.
// 4.  **Size Gate**: Regions smaller than `min_area` are noise and are dropped.
//
// The detector is stateless: one mask in, one frame of detections out.

use crate::config::TrackerConfig;
use crate::core_modules::detection::{BoundingBox, Detection, Frame};
use crate::error::SourceError;
use crate::pipeline::DetectionSource;
use image::GrayImage;

pub struct MaskDetector {
    /// Pixels strictly above this value count as foreground.
    pub threshold: u8,
    /// Smallest region, in pixels, that is reported.
    pub min_area: f64,
}

impl MaskDetector {
    pub fn new(threshold: u8, min_area: f64) -> Self {
        Self { threshold, min_area }
    }

    /// A detector for 0/255 masks using the configured area gate.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(127, config.min_area)
    }

    /// Finds all foreground regions of `mask` large enough to report.
    pub fn detect(&self, mask: &GrayImage, timestamp: f64) -> Vec<Detection> {
        let (width, height) = mask.dimensions();
        let mut visited = vec![false; (width as usize) * (height as usize)];
        let mut detections = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if visited[index] || !self.is_foreground(mask, x, y) {
                    continue;
                }

                let region = self.grow_region(mask, x, y, &mut visited);
                if region.area as f64 >= self.min_area {
                    detections.push(region.into_detection(timestamp));
                }
            }
        }

        detections
    }

    fn is_foreground(&self, mask: &GrayImage, x: u32, y: u32) -> bool {
        mask.get_pixel(x, y).0[0] > self.threshold
    }

    /// Iterative flood fill over 8-connected neighbours.
    fn grow_region(&self, mask: &GrayImage, seed_x: u32, seed_y: u32, visited: &mut [bool]) -> Region {
        let (width, height) = mask.dimensions();
        let mut region = Region::new(seed_x, seed_y);
        let mut stack = vec![(seed_x, seed_y)];
        visited[(seed_y * width + seed_x) as usize] = true;

        while let Some((cx, cy)) = stack.pop() {
            region.include(cx, cy);

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let index = (ny * width + nx) as usize;
                    if !visited[index] && self.is_foreground(mask, nx, ny) {
                        visited[index] = true;
                        stack.push((nx, ny));
                    }
                }
            }
        }

        region
    }
}

struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u64,
}

impl Region {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
    }

    fn into_detection(self, timestamp: f64) -> Detection {
        let bbox = BoundingBox::new(
            self.min_x as f64,
            self.min_y as f64,
            (self.max_x - self.min_x + 1) as f64,
            (self.max_y - self.min_y + 1) as f64,
        );
        Detection::from_bbox(bbox, self.area as f64, timestamp)
    }
}

/// Adapts a sequence of timestamped masks into a `DetectionSource`.
pub struct MaskSource<I> {
    detector: MaskDetector,
    masks: I,
}

impl<I> MaskSource<I>
where
    I: Iterator<Item = Result<(f64, GrayImage), SourceError>>,
{
    pub fn new(detector: MaskDetector, masks: I) -> Self {
        Self { detector, masks }
    }
}

impl<I> DetectionSource for MaskSource<I>
where
    I: Iterator<Item = Result<(f64, GrayImage), SourceError>>,
{
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.masks.next() {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok((timestamp, mask))) => {
                Ok(Some(Frame::new(timestamp, self.detector.detect(&mask, timestamp))))
            }
        }
    }
}
