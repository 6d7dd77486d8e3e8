use crate::config::ExportSettings;
use crate::plans::LecturePlan;
use crate::render::{FontWait, MountedPage, PageRenderer, PageSpec, RasterRequest};
use crate::templates::{TemplateBlock, TemplateChoice, A4_RATIO, PAGE_WIDTH};
use anyhow::Context;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Seek, Write};
use std::sync::OnceLock;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const A4_WIDTH: f64 = PAGE_WIDTH;
pub const A4_HEIGHT: f64 = A4_WIDTH * A4_RATIO;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct A4Fit {
    pub target_width: f64,
    pub target_height: f64,
    pub scale: f64,
}

/// Target size locked to the A4 ratio and never below the A4 page.
/// Tall content is fitted by height, wide content by width.
pub fn fit_a4(content_width: f64, content_height: f64) -> A4Fit {
    if !(content_width > 0.0 && content_height > 0.0)
        || !content_width.is_finite()
        || !content_height.is_finite()
    {
        return A4Fit {
            target_width: A4_WIDTH,
            target_height: A4_HEIGHT,
            scale: 1.0,
        };
    }
    let content_ratio = content_height / content_width;
    if content_ratio > A4_RATIO {
        let scale = A4_HEIGHT / content_height;
        let target_width = A4_WIDTH.max(content_width * scale);
        let target_height = target_width * A4_RATIO;
        A4Fit {
            target_width,
            target_height,
            scale: target_height / content_height,
        }
    } else {
        let scale = A4_WIDTH / content_width;
        let target_height = A4_HEIGHT.max(content_height * scale);
        let target_width = target_height / A4_RATIO;
        A4Fit {
            target_width,
            target_height,
            scale: target_width / content_width,
        }
    }
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Whitespace runs become `_`; path separators too, so entries stay flat.
pub fn sanitize_file_name(s: &str) -> String {
    re_whitespace()
        .replace_all(s.trim(), "_")
        .replace(['/', '\\'], "_")
}

pub fn export_file_name(
    year_suffix: &str,
    campaign: &str,
    title: &str,
    instructor: &str,
    template_label: &str,
) -> String {
    let parts = [year_suffix, campaign, title, instructor, template_label]
        .iter()
        .map(|p| sanitize_file_name(p))
        .collect::<Vec<_>>();
    format!("{}.jpg", parts.join("_"))
}

/// A plan paired with the template it is rendered into.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub plan: LecturePlan,
    pub template: TemplateChoice,
    pub blocks: Vec<TemplateBlock>,
}

/// One instructor's share of a bulk export.
#[derive(Debug, Clone)]
pub struct InstructorSelection {
    pub instructor: String,
    pub jobs: Vec<ExportJob>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExportItem<'a> {
    pub plan: &'a LecturePlan,
    pub template: &'a TemplateChoice,
    pub blocks: &'a [TemplateBlock],
}

impl ExportItem<'_> {
    pub fn label(&self) -> String {
        format!("{} ({})", self.plan.title, self.plan.instructor)
    }
}

pub fn flatten_selection(selections: &[InstructorSelection]) -> Vec<ExportItem<'_>> {
    selections
        .iter()
        .flat_map(|sel| {
            sel.jobs.iter().map(|job| ExportItem {
                plan: &job.plan,
                template: &job.template,
                blocks: &job.blocks,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    CollectingSelection,
    Running {
        current: usize,
        total: usize,
        label: String,
    },
    Archiving,
    Done {
        written: usize,
        skipped: usize,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSkip {
    pub plan_id: String,
    pub title: String,
    pub instructor: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total: usize,
    pub files: Vec<String>,
    pub skipped: Vec<ExportSkip>,
}

/// Mounts, settles, measures and rasterizes one plan. The mounted page is
/// dropped on every path out of here.
fn render_item<R: PageRenderer + ?Sized>(
    renderer: &mut R,
    settings: &ExportSettings,
    item: &ExportItem<'_>,
) -> anyhow::Result<Vec<u8>> {
    let spec = PageSpec {
        plan: item.plan,
        template: item.template,
        blocks: item.blocks,
    };
    let mut page: Box<dyn MountedPage + '_> = renderer.mount(&spec).context("mount failed")?;
    page.await_layout().context("layout failed")?;
    if page.await_fonts(settings.font_timeout()) == FontWait::TimedOut {
        warn!(
            plan_id = %item.plan.id,
            timeout_ms = settings.font_timeout_ms,
            "font loading timed out; rendering with fallback fonts"
        );
    }
    if !settings.settle_delay().is_zero() {
        std::thread::sleep(settings.settle_delay());
    }
    let (w, h) = page.content_size();
    let fit = fit_a4(w, h);
    let req = RasterRequest {
        width: fit.target_width,
        height: fit.target_height,
        scale: fit.scale,
        pixel_ratio: settings.pixel_ratio,
        jpeg_quality: settings.jpeg_quality,
    };
    page.rasterize(&req).context("rasterize failed")
}

fn unique_name(seen: &mut HashMap<String, usize>, name: String) -> String {
    let count = seen.entry(name.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return name;
    }
    let stem = name.strip_suffix(".jpg").unwrap_or(&name);
    format!("{}_{}.jpg", stem, count)
}

/// Renders every selected plan, one at a time, into a zip written to `out`.
/// A plan that fails to render is skipped; a failure writing the archive
/// ends the batch with an error.
pub fn export_bulk<R, W, F>(
    renderer: &mut R,
    settings: &ExportSettings,
    selections: &[InstructorSelection],
    out: W,
    mut on_progress: F,
) -> anyhow::Result<ExportSummary>
where
    R: PageRenderer + ?Sized,
    W: Write + Seek,
    F: FnMut(&ExportPhase),
{
    on_progress(&ExportPhase::CollectingSelection);
    for sel in selections {
        info!(instructor = %sel.instructor, plans = sel.jobs.len(), "selection collected");
    }
    let items = flatten_selection(selections);
    let mut summary = ExportSummary {
        total: items.len(),
        ..ExportSummary::default()
    };

    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Stored);
    let mut seen = HashMap::new();

    for (i, item) in items.iter().enumerate() {
        on_progress(&ExportPhase::Running {
            current: i + 1,
            total: items.len(),
            label: item.label(),
        });
        let bytes = match render_item(renderer, settings, item) {
            Ok(b) => b,
            Err(e) => {
                warn!(plan_id = %item.plan.id, error = %format!("{:#}", e), "skipping plan");
                summary.skipped.push(ExportSkip {
                    plan_id: item.plan.id.clone(),
                    title: item.plan.title.clone(),
                    instructor: item.plan.instructor.clone(),
                    reason: format!("{:#}", e),
                });
                continue;
            }
        };
        let name = unique_name(
            &mut seen,
            export_file_name(
                &settings.year_suffix,
                &settings.campaign_label,
                &item.plan.title,
                &item.plan.instructor,
                &item.template.display_name(),
            ),
        );
        let written = zip
            .start_file(name.as_str(), opts)
            .map_err(anyhow::Error::from)
            .and_then(|_| zip.write_all(&bytes).map_err(anyhow::Error::from));
        if let Err(e) = written {
            let message = format!("failed to write archive entry {}: {:#}", name, e);
            on_progress(&ExportPhase::Failed {
                message: message.clone(),
            });
            return Err(e.context(message));
        }
        summary.files.push(name);
    }

    on_progress(&ExportPhase::Archiving);
    let finished = zip
        .finish()
        .map_err(anyhow::Error::from)
        .and_then(|mut w| w.flush().map_err(anyhow::Error::from));
    if let Err(e) = finished {
        let message = format!("failed to finalize archive: {:#}", e);
        on_progress(&ExportPhase::Failed {
            message: message.clone(),
        });
        return Err(e.context(message));
    }

    info!(
        total = summary.total,
        written = summary.files.len(),
        skipped = summary.skipped.len(),
        "bulk export finished"
    );
    on_progress(&ExportPhase::Done {
        written: summary.files.len(),
        skipped: summary.skipped.len(),
    });
    Ok(summary)
}
