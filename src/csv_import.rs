use crate::plans::{normalize_weekly, LecturePlan, WeeklyItem};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanField {
    Title,
    Instructor,
    TargetDetail,
    Day,
    Time,
    Course1,
    Material1,
    Course2,
    Material2,
    LearningGoal,
    WeeklyPlan,
    ManagementPlan,
    ParentIntro,
    PromoNote,
    Keywords,
    Etc,
    LastSaved,
}

impl PlanField {
    pub const REQUIRED: [PlanField; 4] = [Self::Title, Self::Instructor, Self::Day, Self::Time];

    pub const ALL: [PlanField; 17] = [
        Self::Title,
        Self::Instructor,
        Self::TargetDetail,
        Self::Day,
        Self::Time,
        Self::Course1,
        Self::Material1,
        Self::Course2,
        Self::Material2,
        Self::LearningGoal,
        Self::WeeklyPlan,
        Self::ManagementPlan,
        Self::ParentIntro,
        Self::PromoNote,
        Self::Keywords,
        Self::Etc,
        Self::LastSaved,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Instructor => "instructor",
            Self::TargetDetail => "targetDetail",
            Self::Day => "day",
            Self::Time => "time",
            Self::Course1 => "course1",
            Self::Material1 => "material1",
            Self::Course2 => "course2",
            Self::Material2 => "material2",
            Self::LearningGoal => "learningGoal",
            Self::WeeklyPlan => "weeklyPlan",
            Self::ManagementPlan => "managementPlan",
            Self::ParentIntro => "parentIntro",
            Self::PromoNote => "promoNote",
            Self::Keywords => "keywords",
            Self::Etc => "etc",
            Self::LastSaved => "lastSaved",
        }
    }

    /// Canonical Korean header, used for error reports and the sample file.
    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "제목",
            Self::Instructor => "강사",
            Self::TargetDetail => "대상",
            Self::Day => "요일",
            Self::Time => "시간",
            Self::Course1 => "과정1",
            Self::Material1 => "교재1",
            Self::Course2 => "과정2",
            Self::Material2 => "교재2",
            Self::LearningGoal => "학습목표",
            Self::WeeklyPlan => "주차별 계획",
            Self::ManagementPlan => "관리계획",
            Self::ParentIntro => "학부모 안내",
            Self::PromoNote => "홍보문구",
            Self::Keywords => "키워드",
            Self::Etc => "기타",
            Self::LastSaved => "최종저장",
        }
    }
}

// Normalized (trimmed, lowercased) header -> field.
const HEADER_SYNONYMS: &[(&str, PlanField)] = &[
    ("제목", PlanField::Title),
    ("강좌명", PlanField::Title),
    ("수업명", PlanField::Title),
    ("강의명", PlanField::Title),
    ("title", PlanField::Title),
    ("강사", PlanField::Instructor),
    ("강사명", PlanField::Instructor),
    ("선생님", PlanField::Instructor),
    ("instructor", PlanField::Instructor),
    ("teacher", PlanField::Instructor),
    ("대상", PlanField::TargetDetail),
    ("수강대상", PlanField::TargetDetail),
    ("수강 대상", PlanField::TargetDetail),
    ("대상학년", PlanField::TargetDetail),
    ("target", PlanField::TargetDetail),
    ("target detail", PlanField::TargetDetail),
    ("요일", PlanField::Day),
    ("수업요일", PlanField::Day),
    ("수업 요일", PlanField::Day),
    ("day", PlanField::Day),
    ("시간", PlanField::Time),
    ("수업시간", PlanField::Time),
    ("수업 시간", PlanField::Time),
    ("time", PlanField::Time),
    ("과정1", PlanField::Course1),
    ("과정명1", PlanField::Course1),
    ("course1", PlanField::Course1),
    ("course 1", PlanField::Course1),
    ("교재1", PlanField::Material1),
    ("교재명1", PlanField::Material1),
    ("material1", PlanField::Material1),
    ("material 1", PlanField::Material1),
    ("과정2", PlanField::Course2),
    ("과정명2", PlanField::Course2),
    ("course2", PlanField::Course2),
    ("course 2", PlanField::Course2),
    ("교재2", PlanField::Material2),
    ("교재명2", PlanField::Material2),
    ("material2", PlanField::Material2),
    ("material 2", PlanField::Material2),
    ("학습목표", PlanField::LearningGoal),
    ("학습 목표", PlanField::LearningGoal),
    ("수업목표", PlanField::LearningGoal),
    ("learning goal", PlanField::LearningGoal),
    ("goal", PlanField::LearningGoal),
    ("주차별 계획", PlanField::WeeklyPlan),
    ("주차별계획", PlanField::WeeklyPlan),
    ("주간계획", PlanField::WeeklyPlan),
    ("커리큘럼", PlanField::WeeklyPlan),
    ("weekly plan", PlanField::WeeklyPlan),
    ("curriculum", PlanField::WeeklyPlan),
    ("관리계획", PlanField::ManagementPlan),
    ("관리 계획", PlanField::ManagementPlan),
    ("학습관리", PlanField::ManagementPlan),
    ("management plan", PlanField::ManagementPlan),
    ("학부모 안내", PlanField::ParentIntro),
    ("학부모안내", PlanField::ParentIntro),
    ("parent intro", PlanField::ParentIntro),
    ("홍보문구", PlanField::PromoNote),
    ("홍보 문구", PlanField::PromoNote),
    ("promo", PlanField::PromoNote),
    ("키워드", PlanField::Keywords),
    ("keywords", PlanField::Keywords),
    ("기타", PlanField::Etc),
    ("비고", PlanField::Etc),
    ("etc", PlanField::Etc),
    ("misc", PlanField::Etc),
    ("notes", PlanField::Etc),
    ("최종저장", PlanField::LastSaved),
    ("최종 저장", PlanField::LastSaved),
    ("최종저장일", PlanField::LastSaved),
    ("마지막 저장", PlanField::LastSaved),
    ("last saved", PlanField::LastSaved),
    ("updated at", PlanField::LastSaved),
];

fn normalize_header(h: &str) -> String {
    h.trim_start_matches(BOM).trim().to_lowercase()
}

pub fn lookup_header(h: &str) -> Option<PlanField> {
    let key = normalize_header(h);
    HEADER_SYNONYMS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, f)| *f)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// Canonical labels of required fields no header resolved to.
    MissingHeaders(Vec<&'static str>),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeaders(labels) => {
                write!(f, "필수 항목이 없습니다: {}", labels.join(", "))
            }
        }
    }
}

impl std::error::Error for ImportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// 1-based physical line where the record starts.
    pub line_no: usize,
    pub fields: Vec<(String, String)>,
}

impl CsvRow {
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

/// Splits text into records. Newlines inside quotes stay part of the record.
fn split_records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line_no = 1usize;
    let mut record_start = 1usize;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            '\n' => {
                line_no += 1;
                if in_quotes {
                    buf.push(ch);
                } else {
                    out.push((record_start, std::mem::take(&mut buf)));
                    record_start = line_no;
                }
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() {
        out.push((record_start, buf));
    }
    out
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Tokenizes CSV text: first non-blank record is the header row, blank
/// records are skipped, short rows pad with "" and extra cells are dropped.
pub fn parse(text: &str) -> ParsedCsv {
    let text = text.trim_start_matches(BOM).replace("\r\n", "\n");
    let mut records = split_records(&text)
        .into_iter()
        .filter(|(_, r)| !r.trim().is_empty());

    let Some((_, header_line)) = records.next() else {
        return ParsedCsv::default();
    };
    let headers = parse_csv_record(&header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let rows = records
        .map(|(line_no, record)| {
            let mut cells = parse_csv_record(&record).into_iter();
            let fields = headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                .collect();
            CsvRow { line_no, fields }
        })
        .collect();

    ParsedCsv { headers, rows }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMapping {
    by_field: HashMap<PlanField, String>,
    pub unmapped: Vec<String>,
}

impl HeaderMapping {
    pub fn header_for(&self, field: PlanField) -> Option<&str> {
        self.by_field.get(&field).map(|s| s.as_str())
    }

    /// Trimmed cell value for a field; empty when the field has no header.
    pub fn value(&self, row: &CsvRow, field: PlanField) -> String {
        self.header_for(field)
            .and_then(|h| row.get(h))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    /// field key -> source header, for previews.
    pub fn to_key_map(&self) -> BTreeMap<&'static str, String> {
        PlanField::ALL
            .into_iter()
            .filter_map(|f| self.by_field.get(&f).map(|h| (f.key(), h.clone())))
            .collect()
    }
}

pub fn map_headers(headers: &[String]) -> Result<HeaderMapping, ImportError> {
    let mut mapping = HeaderMapping::default();
    for h in headers {
        match lookup_header(h) {
            Some(field) => {
                // First matching column wins.
                mapping.by_field.entry(field).or_insert_with(|| h.clone());
            }
            None => mapping.unmapped.push(h.clone()),
        }
    }
    let missing = PlanField::REQUIRED
        .into_iter()
        .filter(|f| !mapping.by_field.contains_key(f))
        .map(PlanField::label)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ImportError::MissingHeaders(missing));
    }
    Ok(mapping)
}

fn re_week_full() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*주차\s*-\s*(.*)$").expect("static regex"))
}

fn re_week_short() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*주\s*-\s*(.*)$").expect("static regex"))
}

fn re_label_split() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s*[-:]\s*(.+)$").expect("static regex"))
}

/// Best-effort split of one curriculum line into (label, topic).
/// Order: "N주차 - x", "N주 - x", "label - x" / "label: x", whole line.
pub fn parse_weekly_line(line: &str) -> WeeklyItem {
    let line = line.trim();
    if let Some(c) = re_week_full().captures(line) {
        return WeeklyItem::new(format!("{}주차", &c[1]), c[2].trim());
    }
    if let Some(c) = re_week_short().captures(line) {
        return WeeklyItem::new(format!("{}주차", &c[1]), c[2].trim());
    }
    if let Some(c) = re_label_split().captures(line) {
        return WeeklyItem::new(c[1].trim(), c[2].trim());
    }
    WeeklyItem::new("", line)
}

/// One item per non-blank line, in source order. No padding.
pub fn parse_weekly_plan(text: &str) -> Vec<WeeklyItem> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(parse_weekly_line)
        .collect()
}

fn re_pre_school() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"예비\s*(중|고)\s*([1-3])?").expect("static regex"))
}

fn re_grade() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(초|중|고)(?:등(?:학교)?)?\s*([1-6])\s*(?:학년)?").expect("static regex")
    })
}

fn re_school_level() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(초|중|고)등").expect("static regex"))
}

fn re_english_grade() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bgrade\s*(\d{1,2})\b").expect("static regex"))
}

fn level_code(level: &str) -> (&'static str, u32) {
    match level {
        "초" => ("E", 6),
        "중" => ("M", 3),
        _ => ("H", 3),
    }
}

/// Audience code from free text ("중2 심화반" -> "M2"). Empty when nothing
/// in the vocabulary matches.
pub fn infer_target_code(detail: &str) -> String {
    if let Some(c) = re_pre_school().captures(detail) {
        let (code, _) = level_code(&c[1]);
        return match c.get(2) {
            Some(n) => format!("PRE_{}{}", code, n.as_str()),
            None => format!("PRE_{}", code),
        };
    }
    for c in re_grade().captures_iter(detail) {
        let (code, max) = level_code(&c[1]);
        let n: u32 = c[2].parse().unwrap_or(0);
        if (1..=max).contains(&n) {
            return format!("{}{}", code, n);
        }
    }
    if let Some(c) = re_school_level().captures(detail) {
        return level_code(&c[1]).0.to_string();
    }
    if let Some(c) = re_english_grade().captures(detail) {
        return format!("G{}", &c[1]);
    }
    String::new()
}

/// Converts one row into a plan with a fresh id.
pub fn build_plan(row: &CsvRow, mapping: &HeaderMapping) -> Result<LecturePlan, String> {
    let get = |f: PlanField| mapping.value(row, f);

    let title = get(PlanField::Title);
    if title.is_empty() {
        return Err("제목이 비어 있습니다".to_string());
    }
    let instructor = get(PlanField::Instructor);
    if instructor.is_empty() {
        return Err("강사명이 비어 있습니다".to_string());
    }
    let target_detail = get(PlanField::TargetDetail);
    let last_saved = get(PlanField::LastSaved);

    Ok(LecturePlan {
        id: Uuid::new_v4().to_string(),
        title,
        instructor,
        target_code: infer_target_code(&target_detail),
        target_detail,
        class_day: get(PlanField::Day),
        class_time: get(PlanField::Time),
        course1: get(PlanField::Course1),
        material1: get(PlanField::Material1),
        course2: get(PlanField::Course2),
        material2: get(PlanField::Material2),
        learning_goal: get(PlanField::LearningGoal),
        management_plan: get(PlanField::ManagementPlan),
        parent_intro: get(PlanField::ParentIntro),
        promo_note: get(PlanField::PromoNote),
        keywords: get(PlanField::Keywords),
        etc_note: get(PlanField::Etc),
        weekly: normalize_weekly(parse_weekly_plan(&get(PlanField::WeeklyPlan))),
        fees: Vec::new(),
        template_category: Default::default(),
        color_theme: Default::default(),
        template_id: None,
        page_size: "A4".to_string(),
        source_saved_at: if last_saved.is_empty() {
            None
        } else {
            Some(last_saved)
        },
    })
}

/// Destination for imported plans.
pub trait PlanSink {
    fn save(&mut self, plan: &LecturePlan) -> anyhow::Result<()>;
}

impl PlanSink for Vec<LecturePlan> {
    fn save(&mut self, plan: &LecturePlan) -> anyhow::Result<()> {
        self.push(plan.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    Empty,
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub plan_ids: Vec<String>,
}

impl ImportReport {
    pub fn outcome(&self) -> ImportOutcome {
        if self.rows == 0 {
            ImportOutcome::Empty
        } else if self.failed == 0 {
            ImportOutcome::AllSucceeded
        } else if self.succeeded == 0 {
            ImportOutcome::AllFailed
        } else {
            ImportOutcome::Partial
        }
    }
}

/// Spreadsheet row number for the i-th data row (header is row 1).
pub fn sheet_row_number(data_index: usize) -> usize {
    data_index + 2
}

/// Converts and saves rows one at a time. A failing row is recorded and the
/// rest still run.
pub fn import_rows<S: PlanSink + ?Sized>(
    parsed: &ParsedCsv,
    mapping: &HeaderMapping,
    sink: &mut S,
) -> ImportReport {
    let mut report = ImportReport {
        rows: parsed.rows.len(),
        ..ImportReport::default()
    };
    for (i, row) in parsed.rows.iter().enumerate() {
        let result = build_plan(row, mapping)
            .map_err(anyhow::Error::msg)
            .and_then(|plan| sink.save(&plan).map(|_| plan.id));
        match result {
            Ok(id) => {
                debug!(row = sheet_row_number(i), line = row.line_no, plan_id = %id, "imported row");
                report.succeeded += 1;
                report.plan_ids.push(id);
            }
            Err(e) => {
                let msg = format!("{}행: {:#}", sheet_row_number(i), e);
                warn!(row = sheet_row_number(i), line = row.line_no, error = %msg, "row import failed");
                report.failed += 1;
                report.errors.push(msg);
            }
        }
    }
    report
}

/// Parse, map and import. Missing required headers reject the whole file
/// before any row is converted.
pub fn import_csv<S: PlanSink + ?Sized>(text: &str, sink: &mut S) -> Result<ImportReport, ImportError> {
    let parsed = parse(text);
    if parsed.headers.is_empty() {
        return Ok(ImportReport::default());
    }
    let mapping = map_headers(&parsed.headers)?;
    Ok(import_rows(&parsed, &mapping, sink))
}

/// Downloadable template: BOM, canonical headers, one example row.
pub fn sample_csv() -> String {
    let fields = [
        PlanField::Title,
        PlanField::Instructor,
        PlanField::TargetDetail,
        PlanField::Day,
        PlanField::Time,
        PlanField::Course1,
        PlanField::Material1,
        PlanField::Course2,
        PlanField::Material2,
        PlanField::LearningGoal,
        PlanField::WeeklyPlan,
        PlanField::ManagementPlan,
        PlanField::Etc,
        PlanField::LastSaved,
    ];
    let example = [
        "중2 수학 내신 대비반",
        "김민지",
        "중등 2학년 내신 준비생",
        "월, 수",
        "19:00-21:00",
        "개념 완성",
        "개념원리 중2-1",
        "유형 훈련",
        "쎈 중2-1",
        "1학기 중간고사 범위 개념 정리와 서술형 대비",
        "1주차 - 유리수와 순환소수\n2주차 - 식의 계산\n3주 - 일차부등식\n4주차 - 연립방정식",
        "매 수업 확인 테스트, 주 1회 오답 클리닉",
        "교재비 별도",
        "2026-01-05 10:00",
    ];
    let mut out = String::new();
    out.push(BOM);
    out.push_str(
        &fields
            .iter()
            .map(|f| csv_quote(f.label()))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    out.push_str(&example.iter().map(|v| csv_quote(v)).collect::<Vec<_>>().join(","));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "제목,강사,요일,시간,주차별 계획\n\
수학 A,김민지,월,19:00,\"1주차 - 적분\n3주 - 함수\n미분\"\n\
영어 B,이서준,화,18:00,\n";

    struct FailOnTitle(&'static str, Vec<LecturePlan>);

    impl PlanSink for FailOnTitle {
        fn save(&mut self, plan: &LecturePlan) -> anyhow::Result<()> {
            if plan.title == self.0 {
                anyhow::bail!("write rejected");
            }
            self.1.push(plan.clone());
            Ok(())
        }
    }

    #[test]
    fn tokenizer_handles_quotes_escapes_and_blank_lines() {
        let text = "\u{feff}제목, 강사 ,요일,시간\n\n\"a, \"\"b\"\"\",kim,월,\n\r\nx,y\n";
        let parsed = parse(text);
        assert_eq!(parsed.headers, vec!["제목", "강사", "요일", "시간"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].get("제목"), Some("a, \"b\""));
        assert_eq!(parsed.rows[0].get("시간"), Some(""));
        assert_eq!(parsed.rows[1].get("요일"), Some(""));
        assert_eq!(parsed.rows[1].line_no, 5);
    }

    #[test]
    fn quoted_newlines_stay_in_one_field() {
        let parsed = parse(BASIC);
        assert_eq!(parsed.rows.len(), 2);
        let weekly = parsed.rows[0].get("주차별 계획").expect("weekly");
        assert_eq!(weekly.lines().count(), 3);
        assert_eq!(parsed.rows[1].line_no, 5);
    }

    #[test]
    fn headers_match_trimmed_and_case_insensitive() {
        let headers = vec![
            " Title ".to_string(),
            "TEACHER".to_string(),
            "요일".to_string(),
            "Time".to_string(),
            "titel".to_string(),
        ];
        let mapping = map_headers(&headers).expect("mapping");
        assert_eq!(mapping.header_for(PlanField::Title), Some(" Title "));
        assert_eq!(mapping.header_for(PlanField::Instructor), Some("TEACHER"));
        assert_eq!(mapping.unmapped, vec!["titel".to_string()]);
    }

    #[test]
    fn missing_required_headers_are_listed_exactly() {
        let headers = vec!["제목".to_string(), "시간".to_string(), "비고".to_string()];
        let err = map_headers(&headers).expect_err("missing");
        assert_eq!(err, ImportError::MissingHeaders(vec!["강사", "요일"]));
        assert!(err.to_string().contains("강사, 요일"));
    }

    #[test]
    fn missing_headers_reject_before_any_row() {
        let mut sink: Vec<LecturePlan> = Vec::new();
        let res = import_csv("제목,강사\n수학,김\n", &mut sink);
        assert_eq!(
            res,
            Err(ImportError::MissingHeaders(vec!["요일", "시간"]))
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn weekly_heuristic_follows_fallback_order() {
        assert_eq!(parse_weekly_line("1주차 - 적분"), WeeklyItem::new("1주차", "적분"));
        assert_eq!(parse_weekly_line("3주 - 함수"), WeeklyItem::new("3주차", "함수"));
        assert_eq!(parse_weekly_line("미분"), WeeklyItem::new("", "미분"));
        assert_eq!(parse_weekly_line("OT: 오리엔테이션"), WeeklyItem::new("OT", "오리엔테이션"));
        assert_eq!(parse_weekly_line("특강 - 모의고사"), WeeklyItem::new("특강", "모의고사"));

        let ten = (1..=10).map(|i| format!("{}주차 - t{}", i, i)).collect::<Vec<_>>().join("\n");
        let items = parse_weekly_plan(&ten);
        assert_eq!(items.len(), 10);
        assert_eq!(items[9], WeeklyItem::new("10주차", "t10"));
    }

    #[test]
    fn target_code_inference() {
        assert_eq!(infer_target_code("중2 심화반"), "M2");
        assert_eq!(infer_target_code("고등학교 1학년"), "H1");
        assert_eq!(infer_target_code("초등 4학년"), "E4");
        assert_eq!(infer_target_code("예비고1 선행"), "PRE_H1");
        assert_eq!(infer_target_code("중등부 전체"), "M");
        assert_eq!(infer_target_code("Grade 7 honors"), "G7");
        assert_eq!(infer_target_code("성인반"), "");
    }

    #[test]
    fn build_plan_pads_weekly_and_fills_labels() {
        let parsed = parse(BASIC);
        let mapping = map_headers(&parsed.headers).expect("mapping");
        let plan = build_plan(&parsed.rows[0], &mapping).expect("plan");
        assert_eq!(plan.weekly.len(), 8);
        assert_eq!(plan.weekly[0], WeeklyItem::new("1주차", "적분"));
        assert_eq!(plan.weekly[1], WeeklyItem::new("3주차", "함수"));
        assert_eq!(plan.weekly[2], WeeklyItem::new("3주차", "미분"));
        assert_eq!(plan.weekly[7], WeeklyItem::new("8주차", ""));
        assert_eq!(plan.course1, "");

        let plan_b = build_plan(&parsed.rows[1], &mapping).expect("plan b");
        assert_eq!(plan_b.weekly.len(), 8);
    }

    #[test]
    fn parsing_twice_is_content_equal() {
        let run = || {
            let mut sink: Vec<LecturePlan> = Vec::new();
            import_csv(BASIC, &mut sink).expect("import");
            sink.into_iter()
                .map(|mut p| {
                    p.id.clear();
                    p
                })
                .collect::<Vec<_>>()
        };
        let a = run();
        assert_eq!(a.len(), 2);
        assert_eq!(a, run());
    }

    #[test]
    fn row_failure_is_isolated() {
        let mut text = String::from("제목,강사,요일,시간\n");
        for i in 1..=5 {
            text.push_str(&format!("plan{},kim,월,19:00\n", i));
        }
        let mut sink = FailOnTitle("plan3", Vec::new());
        let report = import_csv(&text, &mut sink).expect("import");
        assert_eq!(report.rows, 5);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("4행:"), "{}", report.errors[0]);
        assert!(report.errors[0].contains("write rejected"));
        assert_eq!(report.outcome(), ImportOutcome::Partial);
        assert_eq!(sink.1.len(), 4);
    }

    #[test]
    fn outcomes_distinguish_empty_and_all_failed() {
        let mut sink: Vec<LecturePlan> = Vec::new();
        let report = import_csv("", &mut sink).expect("empty");
        assert_eq!(report.rows, 0);
        assert_eq!(report.outcome(), ImportOutcome::Empty);

        let report = import_csv("제목,강사,요일,시간\n,kim,월,1\n,lee,화,2\n", &mut sink).expect("import");
        assert_eq!(report.outcome(), ImportOutcome::AllFailed);
        assert_eq!(report.errors[1], "3행: 제목이 비어 있습니다");
    }

    #[test]
    fn sample_csv_imports_cleanly() {
        let sample = sample_csv();
        assert!(sample.starts_with('\u{feff}'));
        let mut sink: Vec<LecturePlan> = Vec::new();
        let report = import_csv(&sample, &mut sink).expect("import sample");
        assert_eq!(report.succeeded, 1);
        let plan = &sink[0];
        assert_eq!(plan.target_code, "M2");
        assert_eq!(plan.weekly[2], WeeklyItem::new("3주차", "일차부등식"));
        assert_eq!(plan.source_saved_at.as_deref(), Some("2026-01-05 10:00"));
    }
}
