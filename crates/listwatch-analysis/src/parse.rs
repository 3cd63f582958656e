//! Best-effort extraction of structured fields from model output.
//!
//! Parsing never fails. Every category falls back to the generic summary
//! chain: a labeled summary line, then the lines under a summary header, then
//! the first few non-empty lines of the response.

use listwatch_core::TemplateCategory;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest fallback summary, in characters, before `...` is appended.
const FALLBACK_SUMMARY_CHARS: usize = 200;
/// Non-empty lines taken for the last-resort summary.
const FALLBACK_SUMMARY_LINES: usize = 3;
/// Trends joined into a summary when the model gave none.
const TREND_SUMMARY_ITEMS: usize = 3;

/// Section labels the parser looks for. Each field lists alternatives; any of
/// them may appear in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseVocabulary {
    pub overall_sentiment: Vec<String>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub neutral: Vec<String>,
    pub summary: Vec<String>,
    pub trends: Vec<String>,
    pub highlights: Vec<String>,
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

impl Default for ParseVocabulary {
    fn default() -> Self {
        Self {
            overall_sentiment: labels(&["全体的な感情傾向", "全体的な感情", "Overall sentiment"]),
            positive: labels(&["ポジティブ", "Positive"]),
            negative: labels(&["ネガティブ", "Negative"]),
            neutral: labels(&["ニュートラル", "中立", "Neutral"]),
            summary: labels(&["要約", "総括", "まとめ", "結論", "Summary", "Conclusion"]),
            trends: labels(&["主要なトレンド", "トレンド", "Main trends", "Trends"]),
            highlights: labels(&["ハイライト", "重要なポイント", "Highlights", "Key points"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: Option<f64>,
    pub negative: Option<f64>,
    pub neutral: Option<f64>,
}

/// Category-specific result stored in `ai_analysis.output.parsed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ParsedAnalysis {
    Sentiment {
        overall_sentiment: Option<String>,
        distribution: SentimentDistribution,
        summary: String,
    },
    Trend {
        trends: Vec<String>,
        summary: String,
    },
    Summary {
        highlights: Vec<String>,
        summary: String,
    },
    Custom {
        summary: String,
    },
}

impl ParsedAnalysis {
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Sentiment { summary, .. }
            | Self::Trend { summary, .. }
            | Self::Summary { summary, .. }
            | Self::Custom { summary } => summary,
        }
    }

    #[must_use]
    pub fn distribution(&self) -> Option<&SentimentDistribution> {
        match self {
            Self::Sentiment { distribution, .. } => Some(distribution),
            _ => None,
        }
    }

    #[must_use]
    pub fn overall_sentiment(&self) -> Option<&str> {
        match self {
            Self::Sentiment {
                overall_sentiment, ..
            } => overall_sentiment.as_deref(),
            _ => None,
        }
    }
}

/// Regex alternation over escaped labels. An empty label list never matches.
fn alternation(labels: &[String]) -> String {
    let escaped: Vec<String> = labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| regex::escape(l.trim()))
        .collect();
    if escaped.is_empty() {
        r"[^\s\S]".to_string()
    } else {
        escaped.join("|")
    }
}

/// `Label: value` on a single line, tolerating markdown bullets and bold.
fn labeled_line(labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?mi)^[ \t]*(?:[-*#>]+[ \t]*)?\**[ \t]*(?:{})[ \t]*\**[ \t]*[:：][ \t]*(.+?)[ \t]*$",
        alternation(labels)
    ))
}

/// `Label: 70%` on a single line.
fn percentage_line(labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?mi)^[ \t]*(?:[-*]+[ \t]*)?\**[ \t]*(?:{})[ \t]*\**[ \t]*[:：][ \t]*(\d+(?:\.\d+)?)[ \t]*[%％]",
        alternation(labels)
    ))
}

/// A line holding only a section label, optionally followed by a colon.
fn header_line(labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)^[ \t]*(?:#+[ \t]*)?\**[ \t]*(?:{})[ \t]*\**[ \t]*[:：]?[ \t]*\**[ \t]*$",
        alternation(labels)
    ))
}

fn clean_value(value: &str) -> String {
    value.trim().trim_matches('*').trim().to_string()
}

#[derive(Debug, Clone)]
pub struct ResponseParser {
    overall: Regex,
    positive: Regex,
    negative: Regex,
    neutral: Regex,
    summary_line: Regex,
    summary_header: Regex,
    trend_header: Regex,
    highlight_header: Regex,
    bullet: Regex,
}

impl ResponseParser {
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a compiled pattern exceeds regex limits.
    pub fn new(vocabulary: &ParseVocabulary) -> Result<Self, regex::Error> {
        Ok(Self {
            overall: labeled_line(&vocabulary.overall_sentiment)?,
            positive: percentage_line(&vocabulary.positive)?,
            negative: percentage_line(&vocabulary.negative)?,
            neutral: percentage_line(&vocabulary.neutral)?,
            summary_line: labeled_line(&vocabulary.summary)?,
            summary_header: header_line(&vocabulary.summary)?,
            trend_header: header_line(&vocabulary.trends)?,
            highlight_header: header_line(&vocabulary.highlights)?,
            bullet: Regex::new(r"^[ \t]*(?:[-*•・]|\d+[.)])[ \t]+(.+?)[ \t]*$")?,
        })
    }

    #[must_use]
    pub fn parse(&self, raw: &str, category: TemplateCategory) -> ParsedAnalysis {
        match category {
            TemplateCategory::Sentiment => ParsedAnalysis::Sentiment {
                overall_sentiment: first_capture(&self.overall, raw).map(|v| clean_value(&v)),
                distribution: SentimentDistribution {
                    positive: percentage(&self.positive, raw),
                    negative: percentage(&self.negative, raw),
                    neutral: percentage(&self.neutral, raw),
                },
                summary: self.summary(raw),
            },
            TemplateCategory::Trend => {
                let trends = self.bullets_after(&self.trend_header, raw);
                let summary = self.labeled_summary(raw).unwrap_or_else(|| {
                    if trends.is_empty() {
                        self.summary(raw)
                    } else {
                        trends
                            .iter()
                            .take(TREND_SUMMARY_ITEMS)
                            .cloned()
                            .collect::<Vec<_>>()
                            .join("、")
                    }
                });
                ParsedAnalysis::Trend { trends, summary }
            }
            TemplateCategory::Summary => ParsedAnalysis::Summary {
                highlights: self.bullets_after(&self.highlight_header, raw),
                summary: self.summary(raw),
            },
            TemplateCategory::Custom => ParsedAnalysis::Custom {
                summary: self.summary(raw),
            },
        }
    }

    /// The generic summary chain. Always returns something for non-blank input.
    #[must_use]
    pub fn summary(&self, raw: &str) -> String {
        self.labeled_summary(raw)
            .or_else(|| self.section_summary(raw))
            .unwrap_or_else(|| leading_lines(raw))
    }

    fn labeled_summary(&self, raw: &str) -> Option<String> {
        first_capture(&self.summary_line, raw)
            .map(|v| clean_value(&v))
            .filter(|v| !v.is_empty())
    }

    /// Text under a bare summary header, up to the next blank line.
    fn section_summary(&self, raw: &str) -> Option<String> {
        let mut lines = raw.lines().skip_while(|l| !self.summary_header.is_match(l));
        lines.next()?;
        let body: Vec<String> = lines
            .skip_while(|l| l.trim().is_empty())
            .take_while(|l| !l.trim().is_empty())
            .map(|l| {
                self.bullet
                    .captures(l)
                    .map_or_else(|| clean_value(l), |c| clean_value(&c[1]))
            })
            .collect();
        let joined = body.join(" ");
        (!joined.is_empty()).then_some(joined)
    }

    /// Bullet items under the first line matching `header`.
    fn bullets_after(&self, header: &Regex, raw: &str) -> Vec<String> {
        let mut lines = raw.lines().skip_while(|l| !header.is_match(l));
        if lines.next().is_none() {
            return Vec::new();
        }
        let mut items = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                if items.is_empty() {
                    continue;
                }
                break;
            }
            match self.bullet.captures(line) {
                Some(caps) => items.push(clean_value(&caps[1])),
                None => break,
            }
        }
        items
    }
}

fn first_capture(re: &Regex, raw: &str) -> Option<String> {
    re.captures(raw).map(|c| c[1].to_string())
}

fn percentage(re: &Regex, raw: &str) -> Option<f64> {
    first_capture(re, raw).and_then(|v| v.parse().ok())
}

fn leading_lines(raw: &str) -> String {
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(FALLBACK_SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.chars().count() > FALLBACK_SUMMARY_CHARS {
        let truncated: String = joined.chars().take(FALLBACK_SUMMARY_CHARS).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
