use super::*;

fn parser() -> ResponseParser {
    ResponseParser::new(&ParseVocabulary::default()).unwrap()
}

#[test]
fn sentiment_fixture_yields_label_distribution_and_summary() {
    let raw = "全体的な感情傾向: ポジティブ\nポジティブ: 70%\n...\n要約: X";
    let parsed = parser().parse(raw, TemplateCategory::Sentiment);

    assert_eq!(parsed.overall_sentiment(), Some("ポジティブ"));
    let distribution = parsed.distribution().unwrap();
    assert_eq!(distribution.positive, Some(70.0));
    assert_eq!(distribution.negative, None);
    assert_eq!(parsed.summary(), "X");
}

#[test]
fn category_parsers() {
    struct Case {
        name: &'static str,
        raw: &'static str,
        category: TemplateCategory,
        expected: ParsedAnalysis,
    }

    let cases = [
        Case {
            name: "english sentiment with markdown",
            raw: "Overall sentiment: **Negative**\nPositive: 10%\nNegative: 75.5%\nNeutral: 14.5%\nSummary: Users are unhappy.",
            category: TemplateCategory::Sentiment,
            expected: ParsedAnalysis::Sentiment {
                overall_sentiment: Some("Negative".to_string()),
                distribution: SentimentDistribution {
                    positive: Some(10.0),
                    negative: Some(75.5),
                    neutral: Some(14.5),
                },
                summary: "Users are unhappy.".to_string(),
            },
        },
        Case {
            name: "trend with labeled summary",
            raw: "主要なトレンド:\n- AI規制: 議論が活発\n- 半導体: 供給不足\n\n要約: 規制と供給が話題",
            category: TemplateCategory::Trend,
            expected: ParsedAnalysis::Trend {
                trends: vec![
                    "AI規制: 議論が活発".to_string(),
                    "半導体: 供給不足".to_string(),
                ],
                summary: "規制と供給が話題".to_string(),
            },
        },
        Case {
            name: "trend summary joins the first three trends",
            raw: "Main trends:\n1. Rust 2024\n2. WASM\n3. eBPF\n4. Zig",
            category: TemplateCategory::Trend,
            expected: ParsedAnalysis::Trend {
                trends: vec![
                    "Rust 2024".to_string(),
                    "WASM".to_string(),
                    "eBPF".to_string(),
                    "Zig".to_string(),
                ],
                summary: "Rust 2024、WASM、eBPF".to_string(),
            },
        },
        Case {
            name: "daily summary highlights",
            raw: "ハイライト:\n- A\n- B\n総括: 良い一日",
            category: TemplateCategory::Summary,
            expected: ParsedAnalysis::Summary {
                highlights: vec!["A".to_string(), "B".to_string()],
                summary: "良い一日".to_string(),
            },
        },
        Case {
            name: "custom reads the section under a summary header",
            raw: "分析結果\n\n## 要約\n今日は静かでした。\n特に大きな動きなし。\n\n以上",
            category: TemplateCategory::Custom,
            expected: ParsedAnalysis::Custom {
                summary: "今日は静かでした。 特に大きな動きなし。".to_string(),
            },
        },
        Case {
            name: "custom falls back to leading lines",
            raw: "line one\n\nline two\nline three\nline four",
            category: TemplateCategory::Custom,
            expected: ParsedAnalysis::Custom {
                summary: "line one line two line three".to_string(),
            },
        },
        Case {
            name: "unstructured sentiment still gets a summary",
            raw: "The mood is mixed.",
            category: TemplateCategory::Sentiment,
            expected: ParsedAnalysis::Sentiment {
                overall_sentiment: None,
                distribution: SentimentDistribution::default(),
                summary: "The mood is mixed.".to_string(),
            },
        },
    ];

    let parser = parser();
    for case in cases {
        assert_eq!(
            parser.parse(case.raw, case.category),
            case.expected,
            "case: {}",
            case.name
        );
    }
}

#[test]
fn long_fallback_summary_is_truncated() {
    let raw = "あ".repeat(300);
    let summary = parser().summary(&raw);
    assert!(summary.ends_with("..."));
    assert_eq!(summary.chars().count(), FALLBACK_SUMMARY_CHARS + 3);
}

#[test]
fn vocabulary_is_configurable() {
    let vocabulary = ParseVocabulary {
        summary: vec!["TL;DR".to_string()],
        ..ParseVocabulary::default()
    };
    let parser = ResponseParser::new(&vocabulary).unwrap();
    assert_eq!(parser.summary("noise\nTL;DR: short"), "short");
    // The default labels are no longer recognised.
    assert_eq!(parser.summary("要約: X"), "要約: X");
}

#[test]
fn empty_label_list_never_matches() {
    let vocabulary = ParseVocabulary {
        summary: Vec::new(),
        ..ParseVocabulary::default()
    };
    let parser = ResponseParser::new(&vocabulary).unwrap();
    assert_eq!(parser.summary("first\nsecond"), "first second");
}

#[test]
fn partial_vocabulary_yaml_keeps_other_defaults() {
    let vocabulary: ParseVocabulary = serde_yaml::from_str("summary: [Resumen]").unwrap();
    assert_eq!(vocabulary.summary, vec!["Resumen".to_string()]);
    assert_eq!(vocabulary.positive, ParseVocabulary::default().positive);
}

#[test]
fn parsed_result_is_tagged_by_category() {
    let parsed = ParsedAnalysis::Custom {
        summary: "s".to_string(),
    };
    let json = serde_json::to_value(&parsed).unwrap();
    assert_eq!(json["category"], "custom");
    assert_eq!(json["summary"], "s");
}
