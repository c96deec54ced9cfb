//! Usage patterns across many conversations: which tools travel together,
//! when work happens, how sessions bunch up, and how heavy they are.

use crate::transcript::models::{Conversation, ConversationMetadata, ToolStatus};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const TOP_SEQUENCES: usize = 10;
const MIN_CALLS_FOR_RATE: usize = 3;
const MOST_COMPLEX: usize = 5;
const LEAST_COMPLEX: usize = 3;

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tool patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SequenceCount {
    pub first: String,
    pub second: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SuccessRate {
    pub total: usize,
    pub successful: usize,
    /// Percent, one decimal.
    pub rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolPatterns {
    /// tool → other tool → conversations using both.
    pub co_occurrence: BTreeMap<String, BTreeMap<String, usize>>,
    pub common_sequences: Vec<SequenceCount>,
    /// Only tools called at least three times.
    pub success_rates: BTreeMap<String, SuccessRate>,
}

pub fn tool_patterns(conversations: &[Conversation]) -> ToolPatterns {
    let mut patterns = ToolPatterns::default();
    let mut sequences: HashMap<(String, String), usize> = HashMap::new();
    let mut outcomes: HashMap<String, (usize, usize)> = HashMap::new();

    for conv in conversations {
        let unique: BTreeSet<&str> = conv.unique_tools();
        for a in &unique {
            for b in &unique {
                if a != b {
                    *patterns
                        .co_occurrence
                        .entry(a.to_string())
                        .or_default()
                        .entry(b.to_string())
                        .or_insert(0) += 1;
                }
            }
        }

        for pair in conv.tool_calls.windows(2) {
            let key = (pair[0].name.clone(), pair[1].name.clone());
            *sequences.entry(key).or_insert(0) += 1;
        }

        for call in &conv.tool_calls {
            let entry = outcomes.entry(call.name.clone()).or_insert((0, 0));
            entry.0 += 1;
            if call.status == ToolStatus::Completed {
                entry.1 += 1;
            }
        }
    }

    let mut ranked: Vec<SequenceCount> = sequences
        .into_iter()
        .map(|((first, second), count)| SequenceCount {
            first,
            second,
            count,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.first.cmp(&b.first))
            .then_with(|| a.second.cmp(&b.second))
    });
    ranked.truncate(TOP_SEQUENCES);
    patterns.common_sequences = ranked;

    for (tool, (total, successful)) in outcomes {
        if total >= MIN_CALLS_FOR_RATE {
            patterns.success_rates.insert(
                tool,
                SuccessRate {
                    total,
                    successful,
                    rate: round1(successful as f64 / total as f64 * 100.0),
                },
            );
        }
    }

    patterns
}

// ---------------------------------------------------------------------------
// Temporal patterns
// ---------------------------------------------------------------------------

pub const DURATION_BUCKETS: &[&str] = &["<1 min", "1-5 min", "5-15 min", "15-60 min", ">1 hour"];

fn duration_bucket(seconds: f64) -> &'static str {
    match seconds {
        s if s < 60.0 => DURATION_BUCKETS[0],
        s if s < 300.0 => DURATION_BUCKETS[1],
        s if s < 900.0 => DURATION_BUCKETS[2],
        s if s < 3600.0 => DURATION_BUCKETS[3],
        _ => DURATION_BUCKETS[4],
    }
}

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabeledCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TemporalPatterns {
    /// Hour of day (UTC) → conversations started.
    pub hourly: BTreeMap<u32, usize>,
    /// Monday first; days without conversations are omitted.
    pub daily: Vec<LabeledCount>,
    /// All five buckets, shortest first.
    pub duration_buckets: Vec<LabeledCount>,
    pub peak_hour: Option<u32>,
    pub peak_day: Option<String>,
}

pub fn temporal_patterns(metas: &[ConversationMetadata]) -> TemporalPatterns {
    let mut out = TemporalPatterns::default();
    let mut by_day = [0usize; 7];
    let mut buckets: HashMap<&'static str, usize> = HashMap::new();

    for meta in metas {
        if let Some(start) = meta.start_time {
            *out.hourly.entry(start.hour()).or_insert(0) += 1;
            by_day[start.weekday().num_days_from_monday() as usize] += 1;
        }
        if let Some(d) = meta.duration_seconds {
            *buckets.entry(duration_bucket(d)).or_insert(0) += 1;
        }
    }

    // Earliest hour wins ties.
    out.peak_hour = out
        .hourly
        .iter()
        .fold(None, |best: Option<(u32, usize)>, (&h, &c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((h, c)),
        })
        .map(|(h, _)| h);

    let mut peak: Option<(usize, usize)> = None;
    for (i, &count) in by_day.iter().enumerate() {
        if count == 0 {
            continue;
        }
        out.daily.push(LabeledCount {
            label: WEEKDAYS[i].to_string(),
            count,
        });
        if peak.map_or(true, |(_, best)| count > best) {
            peak = Some((i, count));
        }
    }
    out.peak_day = peak.map(|(i, _)| WEEKDAYS[i].to_string());

    out.duration_buckets = DURATION_BUCKETS
        .iter()
        .map(|label| LabeledCount {
            label: label.to_string(),
            count: buckets.get(label).copied().unwrap_or(0),
        })
        .collect();

    out
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub session_ids: Vec<String>,
    pub size: usize,
}

/// Group conversations whose starts are at most `gap_hours` apart.
/// Only clusters of two or more are returned.
pub fn conversation_clusters(metas: &[ConversationMetadata], gap_hours: i64) -> Vec<Cluster> {
    let gap = Duration::hours(gap_hours);
    let mut started: Vec<&ConversationMetadata> =
        metas.iter().filter(|m| m.start_time.is_some()).collect();
    started.sort_by_key(|m| m.start_time);

    let mut groups: Vec<Vec<&ConversationMetadata>> = Vec::new();
    for meta in started {
        let joins = groups
            .last()
            .and_then(|g| g.last())
            .and_then(|prev| Some(meta.start_time? - prev.start_time?))
            .is_some_and(|delta| delta <= gap);
        match groups.last_mut() {
            Some(group) if joins => group.push(meta),
            _ => groups.push(vec![meta]),
        }
    }

    groups
        .into_iter()
        .filter(|g| g.len() > 1)
        .filter_map(|g| {
            let start = g.first()?.start_time?;
            let end = g
                .iter()
                .filter_map(|m| m.end_time.or(m.start_time))
                .max()?;
            Some(Cluster {
                start,
                end,
                size: g.len(),
                session_ids: g.iter().map(|m| m.session_id.clone()).collect(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ComplexityScore {
    pub session_id: String,
    pub score: f64,
    pub tool_calls: usize,
    pub messages: usize,
    pub unique_tools: usize,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplexityReport {
    pub avg_tools_per_conversation: f64,
    pub avg_messages_per_conversation: f64,
    pub conversations_with_errors: usize,
    /// Percent, one decimal.
    pub error_rate: f64,
    pub most_complex: Vec<ComplexityScore>,
    /// Present only with more than three conversations.
    pub least_complex: Vec<ComplexityScore>,
}

/// `tools*2 + messages + unique_tools*3 + minutes*0.5`
pub fn complexity_score(conv: &Conversation) -> ComplexityScore {
    let tool_calls = conv.tool_calls.len();
    let messages = conv.messages.len();
    let unique_tools = conv.unique_tools().len();
    let duration_minutes = conv.duration().unwrap_or(0.0) / 60.0;
    let score = tool_calls as f64 * 2.0
        + messages as f64
        + unique_tools as f64 * 3.0
        + duration_minutes * 0.5;
    ComplexityScore {
        session_id: conv.metadata.session_id.clone(),
        score: round1(score),
        tool_calls,
        messages,
        unique_tools,
        duration_minutes: round1(duration_minutes),
    }
}

pub fn complexity(conversations: &[Conversation]) -> ComplexityReport {
    if conversations.is_empty() {
        return ComplexityReport::default();
    }
    let n = conversations.len() as f64;
    let total_tools: usize = conversations.iter().map(|c| c.tool_calls.len()).sum();
    let total_messages: usize = conversations.iter().map(|c| c.messages.len()).sum();
    let with_errors = conversations.iter().filter(|c| c.has_errors()).count();

    let mut scores: Vec<ComplexityScore> = conversations.iter().map(complexity_score).collect();
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let least_complex = if scores.len() > LEAST_COMPLEX {
        scores.iter().rev().take(LEAST_COMPLEX).cloned().collect()
    } else {
        Vec::new()
    };
    scores.truncate(MOST_COMPLEX);

    ComplexityReport {
        avg_tools_per_conversation: round1(total_tools as f64 / n),
        avg_messages_per_conversation: round1(total_messages as f64 / n),
        conversations_with_errors: with_errors,
        error_rate: round1(with_errors as f64 / n * 100.0),
        most_complex: scores,
        least_complex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::models::{Message, MessageType, ToolCall};
    use claude_log::parse_timestamp;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn meta(id: &str, start: &str, secs: f64) -> ConversationMetadata {
        let start = ts(start);
        ConversationMetadata {
            session_id: id.to_string(),
            file_path: format!("ses_{id}.jsonl").into(),
            start_time: Some(start),
            end_time: Some(start + Duration::milliseconds((secs * 1000.0) as i64)),
            message_count: 0,
            tool_call_count: 0,
            file_size_bytes: 0,
            duration_seconds: Some(secs),
        }
    }

    fn conv(id: &str, calls: &[(&str, bool)], messages: usize, secs: f64) -> Conversation {
        let m = meta(id, "2025-01-13T10:00:00Z", secs);
        let at = m.start_time.unwrap();
        Conversation {
            messages: (0..messages)
                .map(|_| Message {
                    message_type: MessageType::User,
                    timestamp: at,
                    content: json!("x"),
                    role: None,
                })
                .collect(),
            tool_calls: calls
                .iter()
                .map(|(name, ok)| ToolCall {
                    id: format!("{name}_id"),
                    name: name.to_string(),
                    input: json!({}),
                    status: if *ok { ToolStatus::Completed } else { ToolStatus::Error },
                    start_time: at,
                    end_time: Some(at),
                    error: None,
                    target: None,
                })
                .collect(),
            metadata: m,
        }
    }

    #[test]
    fn co_occurrence_is_symmetric_per_conversation() {
        let convs = vec![
            conv("a", &[("grep", true), ("read", true), ("grep", true)], 1, 0.0),
            conv("b", &[("read", true), ("edit", true)], 1, 0.0),
        ];
        let p = tool_patterns(&convs);
        assert_eq!(p.co_occurrence["grep"]["read"], 1);
        assert_eq!(p.co_occurrence["read"]["grep"], 1);
        assert_eq!(p.co_occurrence["read"]["edit"], 1);
        assert!(!p.co_occurrence["grep"].contains_key("grep"));
    }

    #[test]
    fn sequences_ranked_by_count() {
        let convs = vec![
            conv("a", &[("grep", true), ("read", true), ("grep", true), ("read", true)], 1, 0.0),
            conv("b", &[("read", true), ("edit", true)], 1, 0.0),
        ];
        let p = tool_patterns(&convs);
        assert_eq!(
            p.common_sequences[0],
            SequenceCount {
                first: "grep".to_string(),
                second: "read".to_string(),
                count: 2
            }
        );
        assert_eq!(p.common_sequences.len(), 3);
    }

    #[test]
    fn success_rate_needs_three_calls() {
        let convs = vec![conv(
            "a",
            &[("bash", true), ("bash", false), ("bash", true), ("grep", false)],
            1,
            0.0,
        )];
        let p = tool_patterns(&convs);
        assert_eq!(p.success_rates["bash"].rate, 66.7);
        assert!(!p.success_rates.contains_key("grep"));
    }

    #[test]
    fn temporal_buckets_and_peaks() {
        // 2025-01-13 is a Monday.
        let metas = vec![
            meta("a", "2025-01-13T09:15:00Z", 30.0),
            meta("b", "2025-01-13T09:45:00Z", 120.0),
            meta("c", "2025-01-14T14:00:00Z", 7200.0),
        ];
        let t = temporal_patterns(&metas);
        assert_eq!(t.hourly[&9], 2);
        assert_eq!(t.peak_hour, Some(9));
        assert_eq!(t.peak_day.as_deref(), Some("Monday"));
        assert_eq!(t.daily[1].label, "Tuesday");
        let counts: Vec<usize> = t.duration_buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 1]);
    }

    #[test]
    fn clusters_split_on_gap() {
        let metas = vec![
            meta("a", "2025-01-13T09:00:00Z", 60.0),
            meta("b", "2025-01-13T10:30:00Z", 60.0),
            meta("c", "2025-01-13T12:00:00Z", 60.0),
            meta("lonely", "2025-01-14T12:00:00Z", 60.0),
        ];
        let clusters = conversation_clusters(&metas, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].session_ids, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].size, 3);
        assert_eq!(clusters[0].end, ts("2025-01-13T12:01:00Z"));
    }

    #[test]
    fn complexity_scores_and_rankings() {
        let convs = vec![
            conv("big", &[("a", true), ("b", false), ("c", true)], 10, 600.0),
            conv("small", &[], 1, 0.0),
            conv("mid", &[("a", true)], 4, 60.0),
            conv("tiny", &[], 2, 0.0),
        ];
        let score = complexity_score(&convs[0]);
        // 3*2 + 10 + 3*3 + 10*0.5
        assert_eq!(score.score, 30.0);

        let report = complexity(&convs);
        assert_eq!(report.most_complex[0].session_id, "big");
        assert_eq!(report.least_complex[0].session_id, "small");
        assert_eq!(report.least_complex.len(), 3);
        assert_eq!(report.conversations_with_errors, 1);
        assert_eq!(report.error_rate, 25.0);
        assert_eq!(report.avg_tools_per_conversation, 1.0);
        assert_eq!(report.avg_messages_per_conversation, 4.3);
    }

    #[test]
    fn complexity_empty_input() {
        let report = complexity(&[]);
        assert!(report.most_complex.is_empty());
        assert_eq!(report.error_rate, 0.0);
    }
}
