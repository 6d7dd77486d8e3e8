use crate::csv_import::PlanSink;
use crate::templates::{ColorTheme, TemplateCategory, TemplateChoice};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every plan carries exactly this many curriculum slots.
pub const WEEKLY_SLOTS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyItem {
    #[serde(default)]
    pub week_label: String,
    #[serde(default)]
    pub topic: String,
}

impl WeeklyItem {
    pub fn new(week_label: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            week_label: week_label.into(),
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRow {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LecturePlan {
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub target_code: String,
    pub target_detail: String,
    pub class_day: String,
    pub class_time: String,
    pub course1: String,
    pub material1: String,
    pub course2: String,
    pub material2: String,
    pub learning_goal: String,
    pub management_plan: String,
    pub parent_intro: String,
    pub promo_note: String,
    pub keywords: String,
    pub etc_note: String,
    pub weekly: Vec<WeeklyItem>,
    pub fees: Vec<FeeRow>,
    pub template_category: TemplateCategory,
    pub color_theme: ColorTheme,
    pub template_id: Option<String>,
    pub page_size: String,
    pub source_saved_at: Option<String>,
}

impl LecturePlan {
    pub fn template_choice(&self) -> TemplateChoice {
        TemplateChoice {
            category: self.template_category,
            color_theme: self.color_theme,
            template_id: self.template_id.clone(),
        }
    }
}

/// Truncates or pads to `WEEKLY_SLOTS`. Blank labels get the positional
/// default ("3주차").
pub fn normalize_weekly(items: Vec<WeeklyItem>) -> Vec<WeeklyItem> {
    let mut out = items
        .into_iter()
        .take(WEEKLY_SLOTS)
        .map(|w| WeeklyItem {
            week_label: w.week_label.trim().to_string(),
            topic: w.topic.trim().to_string(),
        })
        .collect::<Vec<_>>();
    while out.len() < WEEKLY_SLOTS {
        out.push(WeeklyItem::default());
    }
    for (i, w) in out.iter_mut().enumerate() {
        if w.week_label.is_empty() {
            w.week_label = format!("{}주차", i + 1);
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    #[serde(flatten)]
    pub plan: LecturePlan,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub class_day: String,
    pub class_time: String,
    pub template_category: TemplateCategory,
    pub color_theme: ColorTheme,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub instructor: Option<String>,
    pub trashed: bool,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanPatch {
    pub title: Option<String>,
    pub instructor: Option<String>,
    pub target_code: Option<String>,
    pub target_detail: Option<String>,
    pub class_day: Option<String>,
    pub class_time: Option<String>,
    pub course1: Option<String>,
    pub material1: Option<String>,
    pub course2: Option<String>,
    pub material2: Option<String>,
    pub learning_goal: Option<String>,
    pub management_plan: Option<String>,
    pub parent_intro: Option<String>,
    pub promo_note: Option<String>,
    pub keywords: Option<String>,
    pub etc_note: Option<String>,
    pub weekly: Option<Vec<WeeklyItem>>,
    pub fees: Option<Vec<FeeRow>>,
    pub template_category: Option<TemplateCategory>,
    pub color_theme: Option<ColorTheme>,
    pub template_id: Option<String>,
    pub page_size: Option<String>,
}

impl PlanPatch {
    pub fn apply(self, plan: &mut LecturePlan) {
        fn set(dst: &mut String, v: Option<String>) {
            if let Some(v) = v {
                *dst = v.trim().to_string();
            }
        }
        set(&mut plan.title, self.title);
        set(&mut plan.instructor, self.instructor);
        set(&mut plan.target_code, self.target_code);
        set(&mut plan.target_detail, self.target_detail);
        set(&mut plan.class_day, self.class_day);
        set(&mut plan.class_time, self.class_time);
        set(&mut plan.course1, self.course1);
        set(&mut plan.material1, self.material1);
        set(&mut plan.course2, self.course2);
        set(&mut plan.material2, self.material2);
        set(&mut plan.learning_goal, self.learning_goal);
        set(&mut plan.management_plan, self.management_plan);
        set(&mut plan.parent_intro, self.parent_intro);
        set(&mut plan.promo_note, self.promo_note);
        set(&mut plan.keywords, self.keywords);
        set(&mut plan.etc_note, self.etc_note);
        set(&mut plan.page_size, self.page_size);
        if let Some(weekly) = self.weekly {
            plan.weekly = normalize_weekly(weekly);
        }
        if let Some(fees) = self.fees {
            plan.fees = fees;
        }
        if let Some(c) = self.template_category {
            plan.template_category = c;
        }
        if let Some(t) = self.color_theme {
            plan.color_theme = t;
        }
        if let Some(id) = self.template_id {
            let id = id.trim().to_string();
            plan.template_id = if id.is_empty() { None } else { Some(id) };
        }
    }
}

pub fn insert_plan(conn: &Connection, plan: &LecturePlan, now: &str) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO class_plans(
            id, title, instructor, target_code, target_detail, class_day, class_time,
            course1, material1, course2, material2, learning_goal, management_plan,
            parent_intro, promo_note, keywords, etc_note, template_category, color_theme,
            template_id, page_size, source_saved_at, created_at, updated_at, deleted_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        params![
            plan.id,
            plan.title,
            plan.instructor,
            plan.target_code,
            plan.target_detail,
            plan.class_day,
            plan.class_time,
            plan.course1,
            plan.material1,
            plan.course2,
            plan.material2,
            plan.learning_goal,
            plan.management_plan,
            plan.parent_intro,
            plan.promo_note,
            plan.keywords,
            plan.etc_note,
            plan.template_category.as_str(),
            plan.color_theme.as_str(),
            plan.template_id,
            plan.page_size,
            plan.source_saved_at,
            now,
            now,
        ],
    )?;
    write_children(&tx, plan)?;
    tx.commit()?;
    Ok(())
}

fn write_children(conn: &Connection, plan: &LecturePlan) -> anyhow::Result<()> {
    conn.execute("DELETE FROM weekly_plan_items WHERE plan_id = ?", [&plan.id])?;
    conn.execute("DELETE FROM fee_rows WHERE plan_id = ?", [&plan.id])?;
    for (i, w) in plan.weekly.iter().enumerate() {
        conn.execute(
            "INSERT INTO weekly_plan_items(plan_id, position, week_label, topic) VALUES(?, ?, ?, ?)",
            params![plan.id, i as i64, w.week_label, w.topic],
        )?;
    }
    for (i, f) in plan.fees.iter().enumerate() {
        conn.execute(
            "INSERT INTO fee_rows(id, plan_id, position, label, amount, note) VALUES(?, ?, ?, ?, ?, ?)",
            params![
                Uuid::new_v4().to_string(),
                plan.id,
                i as i64,
                f.label,
                f.amount,
                f.note
            ],
        )?;
    }
    Ok(())
}

const PLAN_COLUMNS: &str = "id, title, instructor, target_code, target_detail, class_day, class_time,
    course1, material1, course2, material2, learning_goal, management_plan,
    parent_intro, promo_note, keywords, etc_note, template_category, color_theme,
    template_id, page_size, source_saved_at, created_at, updated_at, deleted_at";

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PlanRecord> {
    let category: String = r.get(17)?;
    let theme: String = r.get(18)?;
    Ok(PlanRecord {
        plan: LecturePlan {
            id: r.get(0)?,
            title: r.get(1)?,
            instructor: r.get(2)?,
            target_code: r.get(3)?,
            target_detail: r.get(4)?,
            class_day: r.get(5)?,
            class_time: r.get(6)?,
            course1: r.get(7)?,
            material1: r.get(8)?,
            course2: r.get(9)?,
            material2: r.get(10)?,
            learning_goal: r.get(11)?,
            management_plan: r.get(12)?,
            parent_intro: r.get(13)?,
            promo_note: r.get(14)?,
            keywords: r.get(15)?,
            etc_note: r.get(16)?,
            weekly: Vec::new(),
            fees: Vec::new(),
            template_category: TemplateCategory::parse(&category).unwrap_or_default(),
            color_theme: ColorTheme::parse(&theme).unwrap_or_default(),
            template_id: r.get(19)?,
            page_size: r.get(20)?,
            source_saved_at: r.get(21)?,
        },
        created_at: r.get(22)?,
        updated_at: r.get(23)?,
        deleted_at: r.get(24)?,
    })
}

fn load_children(conn: &Connection, plan: &mut LecturePlan) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT week_label, topic FROM weekly_plan_items WHERE plan_id = ? ORDER BY position",
    )?;
    let weekly = stmt
        .query_map([&plan.id], |r| {
            Ok(WeeklyItem {
                week_label: r.get(0)?,
                topic: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    plan.weekly = normalize_weekly(weekly);

    let mut stmt = conn.prepare(
        "SELECT label, amount, note FROM fee_rows WHERE plan_id = ? ORDER BY position",
    )?;
    plan.fees = stmt
        .query_map([&plan.id], |r| {
            Ok(FeeRow {
                label: r.get(0)?,
                amount: r.get(1)?,
                note: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

pub fn load_plan(conn: &Connection, id: &str) -> anyhow::Result<Option<PlanRecord>> {
    let sql = format!("SELECT {} FROM class_plans WHERE id = ?", PLAN_COLUMNS);
    let rec = conn.query_row(&sql, [id], record_from_row).optional()?;
    let Some(mut rec) = rec else {
        return Ok(None);
    };
    load_children(conn, &mut rec.plan)?;
    Ok(Some(rec))
}

pub fn list_plans(conn: &Connection, filter: &PlanFilter) -> anyhow::Result<Vec<PlanSummary>> {
    let deleted_clause = if filter.trashed {
        "deleted_at IS NOT NULL"
    } else {
        "deleted_at IS NULL"
    };
    let sql = format!(
        "SELECT id, title, instructor, class_day, class_time, template_category, color_theme, updated_at, deleted_at
         FROM class_plans
         WHERE {} AND (?1 IS NULL OR instructor = ?1)
         ORDER BY instructor, title, rowid",
        deleted_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([filter.instructor.as_deref()], |r| {
            let category: String = r.get(5)?;
            let theme: String = r.get(6)?;
            Ok(PlanSummary {
                id: r.get(0)?,
                title: r.get(1)?,
                instructor: r.get(2)?,
                class_day: r.get(3)?,
                class_time: r.get(4)?,
                template_category: TemplateCategory::parse(&category).unwrap_or_default(),
                color_theme: ColorTheme::parse(&theme).unwrap_or_default(),
                updated_at: r.get(7)?,
                deleted_at: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Full active plans for an instructor, in list order.
pub fn plans_for_instructor(conn: &Connection, instructor: &str) -> anyhow::Result<Vec<LecturePlan>> {
    let summaries = list_plans(
        conn,
        &PlanFilter {
            instructor: Some(instructor.to_string()),
            trashed: false,
        },
    )?;
    let mut out = Vec::with_capacity(summaries.len());
    for s in summaries {
        if let Some(rec) = load_plan(conn, &s.id)? {
            out.push(rec.plan);
        }
    }
    Ok(out)
}

/// Returns the updated record, or None if the plan does not exist.
pub fn update_plan(
    conn: &Connection,
    id: &str,
    patch: PlanPatch,
    now: &str,
) -> anyhow::Result<Option<PlanRecord>> {
    let Some(mut rec) = load_plan(conn, id)? else {
        return Ok(None);
    };
    patch.apply(&mut rec.plan);
    let plan = &rec.plan;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE class_plans SET
            title = ?, instructor = ?, target_code = ?, target_detail = ?, class_day = ?,
            class_time = ?, course1 = ?, material1 = ?, course2 = ?, material2 = ?,
            learning_goal = ?, management_plan = ?, parent_intro = ?, promo_note = ?,
            keywords = ?, etc_note = ?, template_category = ?, color_theme = ?,
            template_id = ?, page_size = ?, updated_at = ?
         WHERE id = ?",
        params![
            plan.title,
            plan.instructor,
            plan.target_code,
            plan.target_detail,
            plan.class_day,
            plan.class_time,
            plan.course1,
            plan.material1,
            plan.course2,
            plan.material2,
            plan.learning_goal,
            plan.management_plan,
            plan.parent_intro,
            plan.promo_note,
            plan.keywords,
            plan.etc_note,
            plan.template_category.as_str(),
            plan.color_theme.as_str(),
            plan.template_id,
            plan.page_size,
            now,
            plan.id,
        ],
    )?;
    write_children(&tx, plan)?;
    tx.commit()?;
    rec.updated_at = now.to_string();
    Ok(Some(rec))
}

/// Bulk template change. Returns how many active plans were updated.
pub fn apply_template(
    conn: &Connection,
    ids: &[String],
    choice: &TemplateChoice,
    now: &str,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut n = 0usize;
    for id in ids {
        n += tx.execute(
            "UPDATE class_plans
             SET template_category = ?, color_theme = ?, template_id = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![
                choice.category.as_str(),
                choice.color_theme.as_str(),
                choice.template_id,
                now,
                id
            ],
        )?;
    }
    tx.commit()?;
    Ok(n)
}

pub fn trash_plan(conn: &Connection, id: &str, now: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE class_plans SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        (now, now, id),
    )?;
    Ok(n > 0)
}

pub fn restore_plan(conn: &Connection, id: &str, now: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE class_plans SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
        (now, id),
    )?;
    Ok(n > 0)
}

/// Permanently removes a trashed plan. Active plans are left alone.
pub fn purge_plan(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let trashed: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM class_plans WHERE id = ? AND deleted_at IS NOT NULL",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    if trashed.is_none() {
        return Ok(false);
    }
    tx.execute("DELETE FROM weekly_plan_items WHERE plan_id = ?", [id])?;
    tx.execute("DELETE FROM fee_rows WHERE plan_id = ?", [id])?;
    tx.execute("DELETE FROM class_plans WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(true)
}

pub fn empty_trash(conn: &Connection) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM weekly_plan_items
         WHERE plan_id IN (SELECT id FROM class_plans WHERE deleted_at IS NOT NULL)",
        [],
    )?;
    tx.execute(
        "DELETE FROM fee_rows
         WHERE plan_id IN (SELECT id FROM class_plans WHERE deleted_at IS NOT NULL)",
        [],
    )?;
    let n = tx.execute("DELETE FROM class_plans WHERE deleted_at IS NOT NULL", [])?;
    tx.commit()?;
    Ok(n)
}

/// Persists imported plans, one transaction per plan, optionally stamping
/// every plan with the same template.
pub struct SqlitePlanSink<'c> {
    conn: &'c Connection,
    now: String,
    template: Option<TemplateChoice>,
}

impl<'c> SqlitePlanSink<'c> {
    pub fn new(conn: &'c Connection, now: impl Into<String>) -> Self {
        Self {
            conn,
            now: now.into(),
            template: None,
        }
    }

    pub fn with_template(mut self, choice: TemplateChoice) -> Self {
        self.template = Some(choice);
        self
    }
}

impl PlanSink for SqlitePlanSink<'_> {
    fn save(&mut self, plan: &LecturePlan) -> anyhow::Result<()> {
        match &self.template {
            Some(choice) => {
                let mut plan = plan.clone();
                plan.template_category = choice.category;
                plan.color_theme = choice.color_theme;
                plan.template_id = choice.template_id.clone();
                insert_plan(self.conn, &plan, &self.now)
            }
            None => insert_plan(self.conn, plan, &self.now),
        }
    }
}
