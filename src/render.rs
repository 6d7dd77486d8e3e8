use crate::plans::LecturePlan;
use crate::templates::{BlockKind, BlockRect, Palette, TemplateBlock, TemplateChoice, PAGE_WIDTH};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::time::Duration;
use tracing::trace;

/// Bottom margin added below the lowest block when measuring content.
pub const PAGE_MARGIN: f64 = 40.0;

const TEXT_LINE_HEIGHT: f64 = 18.0;
const TEXT_BAR_HEIGHT: f64 = 10.0;
const CHAR_ADVANCE: f64 = 9.0;
const BLOCK_PADDING: f64 = 12.0;

/// Everything needed to lay out one plan in one template.
#[derive(Debug, Clone, Copy)]
pub struct PageSpec<'a> {
    pub plan: &'a LecturePlan,
    pub template: &'a TemplateChoice,
    pub blocks: &'a [TemplateBlock],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWait {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    /// Target size in page units; the image is this times `pixel_ratio`.
    pub width: f64,
    pub height: f64,
    /// Content-to-target scale factor.
    pub scale: f64,
    pub pixel_ratio: f64,
    pub jpeg_quality: u8,
}

impl RasterRequest {
    pub fn pixel_size(&self) -> (u32, u32) {
        let w = (self.width * self.pixel_ratio).round().max(1.0) as u32;
        let h = (self.height * self.pixel_ratio).round().max(1.0) as u32;
        (w, h)
    }
}

/// Headless rendering service. `mount` acquires an off-screen page scope;
/// the returned page releases it when dropped.
pub trait PageRenderer {
    fn mount<'r>(&'r mut self, page: &PageSpec<'_>) -> anyhow::Result<Box<dyn MountedPage + 'r>>;
}

pub trait MountedPage {
    fn await_layout(&mut self) -> anyhow::Result<()>;
    fn await_fonts(&mut self, timeout: Duration) -> FontWait;
    /// Natural content size in page units.
    fn content_size(&self) -> (f64, f64);
    /// Encodes the page as JPEG. Blocks flagged `exclude_from_export` are
    /// left out.
    fn rasterize(&mut self, req: &RasterRequest) -> anyhow::Result<Vec<u8>>;
}

/// Draws template blocks as a structural raster: theme-colored panels with
/// text shown as bars proportional to its length.
#[derive(Debug, Default)]
pub struct BlockRenderer;

impl BlockRenderer {
    pub fn new() -> Self {
        Self
    }
}

struct LaidOutBlock {
    kind: BlockKind,
    rect: BlockRect,
    z_index: i64,
    exclude: bool,
    lines: Vec<String>,
}

struct BlockPage {
    palette: Palette,
    blocks: Vec<LaidOutBlock>,
    size: Option<(f64, f64)>,
}

fn block_lines(kind: BlockKind, plan: &LecturePlan) -> Vec<String> {
    let non_empty = |v: Vec<String>| -> Vec<String> {
        v.into_iter().filter(|s| !s.trim().is_empty()).collect()
    };
    match kind {
        BlockKind::Header => non_empty(vec![plan.instructor.clone()]),
        BlockKind::Title => non_empty(vec![plan.title.clone()]),
        BlockKind::Target => non_empty(vec![plan.target_detail.clone()]),
        BlockKind::Schedule => non_empty(vec![format!("{} {}", plan.class_day, plan.class_time)]),
        BlockKind::Courses => non_empty(vec![
            format!("{} {}", plan.course1, plan.material1),
            format!("{} {}", plan.course2, plan.material2),
        ]),
        BlockKind::Goal => non_empty(vec![plan.learning_goal.clone()]),
        BlockKind::Weekly => plan
            .weekly
            .iter()
            .map(|w| format!("{} {}", w.week_label, w.topic))
            .collect(),
        BlockKind::Management => non_empty(vec![plan.management_plan.clone()]),
        BlockKind::Fees => plan
            .fees
            .iter()
            .map(|f| format!("{} {} {}", f.label, f.amount, f.note))
            .collect(),
        BlockKind::Promo => non_empty(vec![
            plan.promo_note.clone(),
            plan.parent_intro.clone(),
            plan.keywords.clone(),
        ]),
        BlockKind::Guide => Vec::new(),
    }
}

impl PageRenderer for BlockRenderer {
    fn mount<'r>(&'r mut self, page: &PageSpec<'_>) -> anyhow::Result<Box<dyn MountedPage + 'r>> {
        trace!(plan_id = %page.plan.id, "mount page");
        let blocks = page
            .blocks
            .iter()
            .map(|b| LaidOutBlock {
                kind: b.kind,
                rect: b.rect,
                z_index: b.z_index,
                exclude: b.exclude_from_export,
                lines: block_lines(b.kind, page.plan),
            })
            .collect();
        Ok(Box::new(BlockPage {
            palette: page.template.color_theme.palette(),
            blocks,
            size: None,
        }))
    }
}

impl BlockPage {
    fn measure(&self) -> (f64, f64) {
        let visible = self.blocks.iter().filter(|b| !b.exclude);
        let (right, bottom) = visible.fold((0.0f64, 0.0f64), |(r, b), blk| {
            (r.max(blk.rect.right()), b.max(blk.rect.bottom()))
        });
        (PAGE_WIDTH.max(right), bottom + PAGE_MARGIN)
    }
}

fn fill_rect(img: &mut RgbImage, x: f64, y: f64, w: f64, h: f64, color: [u8; 3]) {
    let (iw, ih) = img.dimensions();
    let x0 = x.floor().max(0.0) as u32;
    let y0 = y.floor().max(0.0) as u32;
    let x1 = ((x + w).ceil().max(0.0) as u32).min(iw);
    let y1 = ((y + h).ceil().max(0.0) as u32).min(ih);
    for py in y0..y1 {
        for px in x0..x1 {
            img.put_pixel(px, py, Rgb(color));
        }
    }
}

fn draw_block(img: &mut RgbImage, blk: &LaidOutBlock, palette: &Palette, s: f64) {
    let r = blk.rect;
    let (panel, text) = match blk.kind {
        BlockKind::Header => (palette.primary, palette.background),
        BlockKind::Title => (palette.background, palette.primary),
        _ => (palette.surface, palette.ink),
    };
    fill_rect(img, r.x * s, r.y * s, r.w * s, r.h * s, panel);

    let avail = (r.w - 2.0 * BLOCK_PADDING).max(0.0);
    let max_lines = ((r.h - 2.0 * BLOCK_PADDING) / TEXT_LINE_HEIGHT).floor().max(0.0) as usize;
    let mut line_idx = 0usize;
    for line in &blk.lines {
        let mut remaining = line.chars().count() as f64 * CHAR_ADVANCE;
        while remaining > 0.0 && line_idx < max_lines {
            let w = remaining.min(avail);
            let y = r.y + BLOCK_PADDING + line_idx as f64 * TEXT_LINE_HEIGHT;
            let color = if blk.kind == BlockKind::Weekly && line_idx % 2 == 1 {
                palette.accent
            } else {
                text
            };
            fill_rect(img, (r.x + BLOCK_PADDING) * s, y * s, w * s, TEXT_BAR_HEIGHT * s, color);
            remaining -= w;
            line_idx += 1;
        }
    }
}

impl MountedPage for BlockPage {
    fn await_layout(&mut self) -> anyhow::Result<()> {
        self.size = Some(self.measure());
        Ok(())
    }

    fn await_fonts(&mut self, _timeout: Duration) -> FontWait {
        // Bars need no font files.
        FontWait::Ready
    }

    fn content_size(&self) -> (f64, f64) {
        self.size.unwrap_or_else(|| self.measure())
    }

    fn rasterize(&mut self, req: &RasterRequest) -> anyhow::Result<Vec<u8>> {
        if !(req.scale.is_finite() && req.scale > 0.0) {
            anyhow::bail!("invalid raster scale {}", req.scale);
        }
        let (w, h) = req.pixel_size();
        let mut img = RgbImage::from_pixel(w, h, Rgb(self.palette.background));
        let s = req.scale * req.pixel_ratio;

        let mut order = self.blocks.iter().filter(|b| !b.exclude).collect::<Vec<_>>();
        order.sort_by_key(|b| b.z_index);
        for blk in order {
            draw_block(&mut img, blk, &self.palette, s);
        }

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, req.jpeg_quality).encode_image(&img)?;
        Ok(out)
    }
}

impl Drop for BlockPage {
    fn drop(&mut self) {
        trace!("unmount page");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::{normalize_weekly, WeeklyItem};
    use crate::templates::{default_blocks, ColorTheme, TemplateCategory};

    fn plan() -> LecturePlan {
        LecturePlan {
            id: "p1".to_string(),
            title: "수학 심화".to_string(),
            instructor: "김민지".to_string(),
            weekly: normalize_weekly(vec![WeeklyItem::new("1주차", "집합과 명제")]),
            ..LecturePlan::default()
        }
    }

    #[test]
    fn measured_size_ignores_excluded_blocks() {
        let p = plan();
        let choice = TemplateChoice::new(TemplateCategory::Premium, ColorTheme::Navy);
        let blocks = default_blocks(choice.category);
        let mut r = BlockRenderer::new();
        let mut page = r
            .mount(&PageSpec {
                plan: &p,
                template: &choice,
                blocks: &blocks,
            })
            .expect("mount");
        page.await_layout().expect("layout");
        let (w, h) = page.content_size();
        assert_eq!(w, PAGE_WIDTH);
        assert_eq!(h, 1052.0 + 160.0 + PAGE_MARGIN);
    }

    #[test]
    fn rasterize_produces_jpeg_of_requested_size() {
        let p = plan();
        let choice = TemplateChoice::new(TemplateCategory::Basic, ColorTheme::Orange);
        let blocks = default_blocks(choice.category);
        let mut r = BlockRenderer::new();
        let mut page = r
            .mount(&PageSpec {
                plan: &p,
                template: &choice,
                blocks: &blocks,
            })
            .expect("mount");
        let req = RasterRequest {
            width: 200.0,
            height: 283.0,
            scale: 0.25,
            pixel_ratio: 2.0,
            jpeg_quality: 80,
        };
        let bytes = page.rasterize(&req).expect("rasterize");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).expect("decode");
        assert_eq!(decoded.width(), 400);
        assert_eq!(decoded.height(), 566);
    }

    #[test]
    fn rasterize_rejects_bad_scale() {
        let p = plan();
        let choice = TemplateChoice::default();
        let blocks = default_blocks(choice.category);
        let mut r = BlockRenderer::new();
        let mut page = r
            .mount(&PageSpec {
                plan: &p,
                template: &choice,
                blocks: &blocks,
            })
            .expect("mount");
        let req = RasterRequest {
            width: 10.0,
            height: 10.0,
            scale: f64::NAN,
            pixel_ratio: 1.0,
            jpeg_quality: 80,
        };
        assert!(page.rasterize(&req).is_err());
    }
}
