//! Planner (C7): rule-first intent classification and slot extraction.
//! Grounded on `original_source/.../query_router.py`'s regex/keyword
//! dispatch table, reimplemented as the tagged-union `Plan` spec §9
//! calls for rather than a dict of `{intent, slots}`.
//!
//! Classification never requires a `Generator`; a generator may later
//! refine/confirm a plan (not wired here — the core must behave
//! correctly without it, per spec §4.7).

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularField {
    Salary,
    Department,
    Manager,
    EmploymentStatus,
    Position,
    Location,
}

impl TabularField {
    /// Header-normalized aliases (spec §4.7's field keyword table),
    /// matched against `normalize_header`-normalized column names.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TabularField::Salary => &["salary", "annualsalary", "salaryamount", "pay", "compensation", "wage", "earning"],
            TabularField::Department => &["department", "dept", "division", "team", "unit"],
            TabularField::Manager => &["manager", "managername", "supervisor", "boss", "reports_to", "reporting_manager"],
            TabularField::EmploymentStatus => &["employmentstatus", "status", "employment_status", "work_status"],
            TabularField::Position => &["position", "title", "job_title", "role", "designation"],
            TabularField::Location => &["location", "office", "site", "workplace", "based_in"],
        }
    }

    fn from_keyword(lower: &str) -> Option<Self> {
        for field in [
            TabularField::Salary,
            TabularField::Department,
            TabularField::Manager,
            TabularField::EmploymentStatus,
            TabularField::Position,
            TabularField::Location,
        ] {
            if field.aliases().iter().any(|alias| lower.contains(alias) || lower.contains(&alias.replace('_', " "))) {
                return Some(field);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    First,
    Next,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    SensitiveRefusal,
    ChapterNav { base: i64 },
    ChapterCount,
    ChapterTitles { n: Option<usize> },
    ChapterSummary { chapter: i64 },
    ListRequest { mode: ListMode, n: usize, topic: Option<String> },
    TabularField { field: TabularField, person: Option<String> },
    PolicySummary,
    Generic,
}

const SENSITIVE_TERMS: &[&str] = &["ethnicity", "race", "hispanic", "religion", "sexual orientation"];
const TOPIC_KEYWORDS: &[&str] = &[
    "chapter", "program", "project", "management", "roles", "responsibilities", "governance",
    "policy", "process", "procedure", "guideline",
];
const POLICY_NOUNS: &[&str] = &["policy", "policies", "guideline", "rules"];
const POLICY_LEXICON: &[&str] = &["currency", "conversion", "unwithdrawn", "withdrawn"];

static CHAPTER_NAV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)next chapter after chapter\s+(\d+)").unwrap());
static CHAPTER_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)summary of chapter\s+(\d+)").unwrap());
static CHAPTER_TITLES_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());
static LIST_FIRST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:first|top)\s+(\d+)\b.*?\b(?:of|in)\s+(.+)$").unwrap());
static LIST_NEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:next|subsequent)\s+(\d+)\b(?:.*?\b(?:of|in)\s+(.+)$)?").unwrap());
static PERSON_SLOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:of|for)\s+([^?]+)").unwrap());
static HAS_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

pub struct Planner;

/// Conversational memory the planner consults to resolve pronouns; the
/// orchestrator passes the conversation's `context` fields in.
#[derive(Debug, Default, Clone)]
pub struct PlannerContext {
    pub last_person: Option<String>,
}

impl Planner {
    /// Classify `utterance` into a `Plan`, consulting `context` only to
    /// resolve a pronoun back to the last referenced person.
    pub fn classify(utterance: &str, context: &PlannerContext) -> Plan {
        let lower = utterance.to_lowercase();

        if SENSITIVE_TERMS.iter().any(|t| lower.contains(t)) {
            return Plan::SensitiveRefusal;
        }

        if let Some(caps) = CHAPTER_NAV.captures(&lower) {
            if let Ok(base) = caps[1].parse::<i64>() {
                return Plan::ChapterNav { base };
            }
        }

        if lower.contains("how many chapters")
            || lower.contains("number of chapters")
            || lower.contains("chapters are there")
        {
            return Plan::ChapterCount;
        }

        if let Some(caps) = CHAPTER_SUMMARY.captures(&lower) {
            if let Ok(chapter) = caps[1].parse::<i64>() {
                return Plan::ChapterSummary { chapter };
            }
        }

        if lower.contains("chapter") && (lower.contains("title") || lower.contains("list")) {
            let n = CHAPTER_TITLES_N.captures(&lower).and_then(|c| c[1].parse::<usize>().ok());
            return Plan::ChapterTitles { n };
        }

        if let Some(caps) = LIST_FIRST.captures(&lower) {
            if let Ok(n) = caps[1].parse::<usize>() {
                let topic = caps.get(2).map(|m| m.as_str().trim().to_string());
                return Plan::ListRequest { mode: ListMode::First, n, topic };
            }
        }

        if let Some(caps) = LIST_NEXT.captures(&lower) {
            if let Ok(n) = caps[1].parse::<usize>() {
                let topic = caps.get(2).map(|m| m.as_str().trim().to_string());
                return Plan::ListRequest { mode: ListMode::Next, n, topic };
            }
        }

        if let Some(field) = TabularField::from_keyword(&lower) {
            if looks_like_person_query(&lower) {
                let person = extract_person(utterance, &lower, context);
                return Plan::TabularField { field, person };
            }
        }

        if POLICY_NOUNS.iter().any(|n| lower.contains(n)) && POLICY_LEXICON.iter().any(|t| lower.contains(t)) {
            return Plan::PolicySummary;
        }

        Plan::Generic
    }
}

/// A phrase "looks like a person" iff it contains no digits, carries no
/// topic keyword, and is either `Last, First` or 2-4 whitespace-separated
/// tokens -- checked against the captured person slot (or the pronoun
/// substitution) rather than the whole utterance.
fn looks_like_person_query(lower: &str) -> bool {
    !HAS_DIGIT.is_match(lower) && !TOPIC_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn extract_person(original: &str, lower: &str, context: &PlannerContext) -> Option<String> {
    const PRONOUNS: &[&str] = &["his", "her", "their", "him", "them"];
    if PRONOUNS.iter().any(|p| {
        lower.split_whitespace().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == *p)
    }) {
        return context.last_person.clone();
    }

    PERSON_SLOT.captures(original).map(|caps| caps[1].trim().trim_end_matches('?').trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PlannerContext {
        PlannerContext::default()
    }

    #[test]
    fn classifies_sensitive_refusal() {
        assert_eq!(
            Planner::classify("What is the ethnicity of Akinkuolie, Sarah?", &ctx()),
            Plan::SensitiveRefusal
        );
    }

    #[test]
    fn classifies_chapter_nav() {
        assert_eq!(
            Planner::classify("next chapter after chapter 2", &ctx()),
            Plan::ChapterNav { base: 2 }
        );
    }

    #[test]
    fn classifies_chapter_count() {
        assert_eq!(Planner::classify("how many chapters are there?", &ctx()), Plan::ChapterCount);
    }

    #[test]
    fn classifies_tabular_salary_lookup() {
        let plan = Planner::classify("What is the salary of Akinkuolie, Sarah?", &ctx());
        match plan {
            Plan::TabularField { field, person } => {
                assert_eq!(field, TabularField::Salary);
                assert_eq!(person.as_deref(), Some("Akinkuolie, Sarah"));
            }
            other => panic!("expected TabularField, got {other:?}"),
        }
    }

    #[test]
    fn tabular_field_skipped_when_topic_keyword_present() {
        // "management" is a topic keyword, so this should not look like a person query.
        let plan = Planner::classify("what is the department of the management process?", &ctx());
        assert_eq!(plan, Plan::Generic);
    }

    #[test]
    fn pronoun_resolves_to_last_person_in_context() {
        let context = PlannerContext {
            last_person: Some("Akinkuolie, Sarah".to_string()),
        };
        let plan = Planner::classify("what is her salary?", &context);
        match plan {
            Plan::TabularField { field, person } => {
                assert_eq!(field, TabularField::Salary);
                assert_eq!(person.as_deref(), Some("Akinkuolie, Sarah"));
            }
            other => panic!("expected TabularField, got {other:?}"),
        }
    }

    #[test]
    fn classifies_policy_summary() {
        let plan = Planner::classify(
            "What is the policy on currency conversion of the unwithdrawn loan amount?",
            &ctx(),
        );
        assert_eq!(plan, Plan::PolicySummary);
    }

    #[test]
    fn classifies_list_first_and_next() {
        let first = Planner::classify("first 3 processes of project management", &ctx());
        assert_eq!(
            first,
            Plan::ListRequest { mode: ListMode::First, n: 3, topic: Some("project management".to_string()) }
        );
        let next = Planner::classify("next 2", &ctx());
        assert_eq!(next, Plan::ListRequest { mode: ListMode::Next, n: 2, topic: None });
    }

    #[test]
    fn falls_back_to_generic() {
        assert_eq!(Planner::classify("what time is it in Jakarta?", &ctx()), Plan::Generic);
    }
}
