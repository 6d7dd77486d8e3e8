use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Off-screen page width in CSS pixels (A4 at 96 dpi).
pub const PAGE_WIDTH: f64 = 794.0;
pub const A4_RATIO: f64 = 297.0 / 210.0;
pub const MIN_BLOCK_SIZE: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    #[default]
    Basic,
    Curriculum,
    Premium,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 3] = [Self::Basic, Self::Curriculum, Self::Premium];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Curriculum => "curriculum",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn label_ko(self) -> &'static str {
        match self {
            Self::Basic => "기본형",
            Self::Curriculum => "커리큘럼형",
            Self::Premium => "프리미엄형",
        }
    }

    /// Page preset the built-in layout is drawn for.
    pub fn default_page_size(self) -> PageSize {
        match self {
            Self::Premium => PageSize::A4Long,
            Self::Basic | Self::Curriculum => PageSize::A4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTheme {
    #[default]
    Navy,
    Green,
    Orange,
    Purple,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: [u8; 3],
    pub primary: [u8; 3],
    pub accent: [u8; 3],
    pub surface: [u8; 3],
    pub ink: [u8; 3],
}

impl ColorTheme {
    pub const ALL: [ColorTheme; 5] = [
        Self::Navy,
        Self::Green,
        Self::Orange,
        Self::Purple,
        Self::Mono,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navy => "navy",
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Mono => "mono",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn label_ko(self) -> &'static str {
        match self {
            Self::Navy => "네이비",
            Self::Green => "그린",
            Self::Orange => "오렌지",
            Self::Purple => "퍼플",
            Self::Mono => "모노",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Navy => Palette {
                background: [255, 255, 255],
                primary: [27, 42, 89],
                accent: [77, 124, 214],
                surface: [236, 241, 250],
                ink: [40, 44, 52],
            },
            Self::Green => Palette {
                background: [255, 255, 255],
                primary: [29, 99, 66],
                accent: [92, 177, 121],
                surface: [234, 246, 238],
                ink: [38, 50, 42],
            },
            Self::Orange => Palette {
                background: [255, 252, 247],
                primary: [201, 92, 24],
                accent: [245, 158, 66],
                surface: [253, 238, 222],
                ink: [60, 44, 32],
            },
            Self::Purple => Palette {
                background: [255, 255, 255],
                primary: [84, 46, 145],
                accent: [155, 118, 214],
                surface: [242, 236, 251],
                ink: [48, 40, 60],
            },
            Self::Mono => Palette {
                background: [255, 255, 255],
                primary: [33, 33, 33],
                accent: [117, 117, 117],
                surface: [240, 240, 240],
                ink: [33, 33, 33],
            },
        }
    }
}

/// Page-size preset. Bounds the area template blocks may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    #[serde(rename = "A4")]
    A4,
    #[serde(rename = "A4_LONG")]
    A4Long,
}

impl PageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::A4Long => "A4_LONG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A4" => Some(Self::A4),
            "A4_LONG" => Some(Self::A4Long),
            _ => None,
        }
    }

    pub fn height(self) -> f64 {
        match self {
            Self::A4 => PAGE_WIDTH * A4_RATIO,
            Self::A4Long => 2.0 * PAGE_WIDTH * A4_RATIO,
        }
    }
}

/// Which visual template a plan is rendered into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateChoice {
    pub category: TemplateCategory,
    pub color_theme: ColorTheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

impl TemplateChoice {
    pub fn new(category: TemplateCategory, color_theme: ColorTheme) -> Self {
        Self {
            category,
            color_theme,
            template_id: None,
        }
    }

    /// Localized name used in export file names, e.g. "기본형 네이비".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.category.label_ko(), self.color_theme.label_ko())
    }

    pub fn from_json(v: &Value) -> Result<Self, String> {
        let obj = v.as_object().ok_or("template must be an object")?;
        let category = match obj.get("category").and_then(|v| v.as_str()) {
            Some(s) => TemplateCategory::parse(s).ok_or_else(|| format!("unknown category: {}", s))?,
            None => TemplateCategory::default(),
        };
        let color_theme = match obj.get("colorTheme").and_then(|v| v.as_str()) {
            Some(s) => ColorTheme::parse(s).ok_or_else(|| format!("unknown colorTheme: {}", s))?,
            None => ColorTheme::default(),
        };
        let template_id = obj
            .get("templateId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            template_id,
            ..Self::new(category, color_theme)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Header,
    Title,
    Target,
    Schedule,
    Courses,
    Goal,
    Weekly,
    Management,
    Fees,
    Promo,
    Guide,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Title => "title",
            Self::Target => "target",
            Self::Schedule => "schedule",
            Self::Courses => "courses",
            Self::Goal => "goal",
            Self::Weekly => "weekly",
            Self::Management => "management",
            Self::Fees => "fees",
            Self::Promo => "promo",
            Self::Guide => "guide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let all = [
            Self::Header,
            Self::Title,
            Self::Target,
            Self::Schedule,
            Self::Courses,
            Self::Goal,
            Self::Weekly,
            Self::Management,
            Self::Fees,
            Self::Promo,
            Self::Guide,
        ];
        all.into_iter().find(|k| k.as_str() == s.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BlockRect {
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBlock {
    pub key: String,
    pub kind: BlockKind,
    #[serde(flatten)]
    pub rect: BlockRect,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub exclude_from_export: bool,
}

fn block(key: &str, kind: BlockKind, x: f64, y: f64, w: f64, h: f64) -> TemplateBlock {
    TemplateBlock {
        key: key.to_string(),
        kind,
        rect: BlockRect { x, y, w, h },
        z_index: 0,
        exclude_from_export: false,
    }
}

fn guide_block(page_height: f64) -> TemplateBlock {
    TemplateBlock {
        z_index: 99,
        exclude_from_export: true,
        ..block("guide", BlockKind::Guide, 0.0, 0.0, PAGE_WIDTH, page_height)
    }
}

/// Built-in layout for a category, in page coordinates.
pub fn default_blocks(category: TemplateCategory) -> Vec<TemplateBlock> {
    use BlockKind::*;
    let page_height = category.default_page_size().height();
    match category {
        TemplateCategory::Basic => vec![
            block("header", Header, 0.0, 0.0, PAGE_WIDTH, 96.0),
            block("title", Title, 40.0, 120.0, 714.0, 64.0),
            block("target", Target, 40.0, 200.0, 350.0, 48.0),
            block("schedule", Schedule, 404.0, 200.0, 350.0, 48.0),
            block("courses", Courses, 40.0, 264.0, 714.0, 72.0),
            block("goal", Goal, 40.0, 352.0, 714.0, 96.0),
            block("weekly", Weekly, 40.0, 464.0, 714.0, 360.0),
            block("management", Management, 40.0, 840.0, 714.0, 96.0),
            block("fees", Fees, 40.0, 952.0, 714.0, 120.0),
            guide_block(page_height),
        ],
        TemplateCategory::Curriculum => vec![
            block("header", Header, 0.0, 0.0, PAGE_WIDTH, 80.0),
            block("title", Title, 40.0, 96.0, 714.0, 56.0),
            block("schedule", Schedule, 40.0, 168.0, 714.0, 40.0),
            block("target", Target, 40.0, 216.0, 714.0, 40.0),
            block("weekly", Weekly, 40.0, 272.0, 714.0, 520.0),
            block("courses", Courses, 40.0, 808.0, 714.0, 64.0),
            block("goal", Goal, 40.0, 888.0, 714.0, 80.0),
            block("fees", Fees, 40.0, 984.0, 714.0, 100.0),
            guide_block(page_height),
        ],
        TemplateCategory::Premium => vec![
            block("header", Header, 0.0, 0.0, PAGE_WIDTH, 160.0),
            block("title", Title, 60.0, 180.0, 674.0, 72.0),
            block("promo", Promo, 60.0, 268.0, 674.0, 80.0),
            block("target", Target, 60.0, 364.0, 320.0, 48.0),
            block("schedule", Schedule, 414.0, 364.0, 320.0, 48.0),
            block("goal", Goal, 60.0, 428.0, 674.0, 96.0),
            block("weekly", Weekly, 60.0, 540.0, 674.0, 400.0),
            block("management", Management, 60.0, 956.0, 674.0, 80.0),
            block("fees", Fees, 60.0, 1052.0, 674.0, 160.0),
            guide_block(page_height),
        ],
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Clamps a dragged/resized rectangle so it stays inside the page.
pub fn clamp_rect(rect: BlockRect, page: PageSize) -> BlockRect {
    let page_w = PAGE_WIDTH;
    let page_h = page.height();
    let w = finite_or(rect.w, MIN_BLOCK_SIZE).clamp(MIN_BLOCK_SIZE, page_w);
    let h = finite_or(rect.h, MIN_BLOCK_SIZE).clamp(MIN_BLOCK_SIZE, page_h);
    let x = finite_or(rect.x, 0.0).clamp(0.0, page_w - w);
    let y = finite_or(rect.y, 0.0).clamp(0.0, page_h - h);
    BlockRect { x, y, w, h }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTemplate {
    pub id: String,
    pub name: String,
    pub category: TemplateCategory,
    pub color_theme: ColorTheme,
    pub page_size: PageSize,
    pub created_at: String,
    pub updated_at: String,
}

fn template_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTemplate> {
    let category: String = r.get(2)?;
    let theme: String = r.get(3)?;
    let page_size: String = r.get(4)?;
    Ok(StoredTemplate {
        id: r.get(0)?,
        name: r.get(1)?,
        category: TemplateCategory::parse(&category).unwrap_or_default(),
        color_theme: ColorTheme::parse(&theme).unwrap_or_default(),
        page_size: PageSize::parse(&page_size).unwrap_or_default(),
        created_at: r.get(5)?,
        updated_at: r.get(6)?,
    })
}

pub fn list_templates(conn: &Connection) -> anyhow::Result<Vec<StoredTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, color_theme, page_size, created_at, updated_at
         FROM templates
         ORDER BY name, rowid",
    )?;
    let rows = stmt
        .query_map([], template_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_template(conn: &Connection, id: &str) -> anyhow::Result<Option<StoredTemplate>> {
    let t = conn
        .query_row(
            "SELECT id, name, category, color_theme, page_size, created_at, updated_at
             FROM templates WHERE id = ?",
            [id],
            template_from_row,
        )
        .optional()?;
    Ok(t)
}

pub fn load_blocks(conn: &Connection, template_id: &str) -> anyhow::Result<Vec<TemplateBlock>> {
    let mut stmt = conn.prepare(
        "SELECT block_key, kind, x, y, w, h, z_index, exclude_from_export
         FROM template_blocks
         WHERE template_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([template_id], |r| {
            let kind: String = r.get(1)?;
            Ok(TemplateBlock {
                key: r.get(0)?,
                kind: BlockKind::parse(&kind).unwrap_or(BlockKind::Guide),
                rect: BlockRect {
                    x: r.get(2)?,
                    y: r.get(3)?,
                    w: r.get(4)?,
                    h: r.get(5)?,
                },
                z_index: r.get(6)?,
                exclude_from_export: r.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates a template seeded with the category's built-in blocks.
pub fn create_template(
    conn: &Connection,
    name: &str,
    choice: &TemplateChoice,
    page_size: PageSize,
    now: &str,
) -> anyhow::Result<StoredTemplate> {
    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO templates(id, name, category, color_theme, page_size, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            choice.category.as_str(),
            choice.color_theme.as_str(),
            page_size.as_str(),
            now,
            now,
        ),
    )?;
    let blocks = default_blocks(choice.category)
        .into_iter()
        .map(|mut b| {
            b.rect = clamp_rect(b.rect, page_size);
            b
        })
        .collect::<Vec<_>>();
    write_blocks(&tx, &id, &blocks)?;
    tx.commit()?;
    Ok(StoredTemplate {
        id,
        name: name.to_string(),
        category: choice.category,
        color_theme: choice.color_theme,
        page_size,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    })
}

/// Replaces a template's blocks, clamping every rectangle into the page.
/// Returns the clamped blocks as stored.
pub fn save_blocks(
    conn: &Connection,
    template: &StoredTemplate,
    blocks: &[TemplateBlock],
    now: &str,
) -> anyhow::Result<Vec<TemplateBlock>> {
    let clamped = blocks
        .iter()
        .cloned()
        .map(|mut b| {
            b.rect = clamp_rect(b.rect, template.page_size);
            b
        })
        .collect::<Vec<_>>();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM template_blocks WHERE template_id = ?",
        [&template.id],
    )?;
    write_blocks(&tx, &template.id, &clamped)?;
    tx.execute(
        "UPDATE templates SET updated_at = ? WHERE id = ?",
        (now, &template.id),
    )?;
    tx.commit()?;
    Ok(clamped)
}

fn write_blocks(conn: &Connection, template_id: &str, blocks: &[TemplateBlock]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO template_blocks(id, template_id, block_key, kind, x, y, w, h, z_index, exclude_from_export, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (i, b) in blocks.iter().enumerate() {
        stmt.execute(rusqlite::params![
            Uuid::new_v4().to_string(),
            template_id,
            b.key,
            b.kind.as_str(),
            b.rect.x,
            b.rect.y,
            b.rect.w,
            b.rect.h,
            b.z_index,
            b.exclude_from_export as i64,
            i as i64,
        ])?;
    }
    Ok(())
}

/// Deletes a template. Plans pointing at it fall back to the built-in layout.
pub fn delete_template(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM template_blocks WHERE template_id = ?", [id])?;
    tx.execute(
        "UPDATE class_plans SET template_id = NULL WHERE template_id = ?",
        [id],
    )?;
    let n = tx.execute("DELETE FROM templates WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(n > 0)
}

/// Blocks for rendering: the stored custom layout when it exists and has
/// blocks, else the built-in layout of the chosen category.
pub fn resolve_blocks(conn: &Connection, choice: &TemplateChoice) -> anyhow::Result<Vec<TemplateBlock>> {
    if let Some(id) = choice.template_id.as_deref() {
        let blocks = load_blocks(conn, id)?;
        if !blocks.is_empty() {
            return Ok(blocks);
        }
    }
    Ok(default_blocks(choice.category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_localized() {
        let c = TemplateChoice::new(TemplateCategory::Curriculum, ColorTheme::Green);
        assert_eq!(c.display_name(), "커리큘럼형 그린");
    }

    #[test]
    fn choice_from_json_defaults_and_rejects_unknown() {
        let c = TemplateChoice::from_json(&serde_json::json!({})).expect("defaults");
        assert_eq!(c, TemplateChoice::default());

        let c = TemplateChoice::from_json(&serde_json::json!({
            "category": "Premium",
            "colorTheme": "orange",
            "templateId": "  "
        }))
        .expect("parse");
        assert_eq!(c.category, TemplateCategory::Premium);
        assert_eq!(c.color_theme, ColorTheme::Orange);
        assert_eq!(c.template_id, None);

        assert!(TemplateChoice::from_json(&serde_json::json!({ "colorTheme": "teal" })).is_err());
    }

    #[test]
    fn clamp_keeps_rect_inside_page() {
        let page_h = PageSize::A4.height();
        let r = clamp_rect(
            BlockRect {
                x: -30.0,
                y: page_h - 10.0,
                w: 2000.0,
                h: 5.0,
            },
            PageSize::A4,
        );
        assert_eq!(r.x, 0.0);
        assert_eq!(r.w, PAGE_WIDTH);
        assert_eq!(r.h, MIN_BLOCK_SIZE);
        assert!((r.bottom() - page_h).abs() < 1e-9);

        let r = clamp_rect(
            BlockRect {
                x: f64::NAN,
                y: 100.0,
                w: 100.0,
                h: f64::INFINITY,
            },
            PageSize::A4,
        );
        assert_eq!(r.x, 0.0);
        assert_eq!(r.h, MIN_BLOCK_SIZE);
        assert!(r.right() <= PAGE_WIDTH);
    }

    #[test]
    fn every_default_layout_has_an_excluded_guide() {
        for c in TemplateCategory::ALL {
            let blocks = default_blocks(c);
            assert!(blocks.iter().any(|b| b.exclude_from_export));
            assert!(blocks.iter().any(|b| b.kind == BlockKind::Weekly));
            assert!(blocks.iter().all(|b| b.rect.right() <= PAGE_WIDTH));
        }
    }

    #[test]
    fn default_layouts_fit_their_page_unclamped() {
        for c in TemplateCategory::ALL {
            let page = c.default_page_size();
            for b in default_blocks(c) {
                assert_eq!(clamp_rect(b.rect, page), b.rect, "{} {}", c.as_str(), b.key);
            }
        }
        assert_eq!(TemplateCategory::Premium.default_page_size(), PageSize::A4Long);
    }
}
