//! Prompt rendering for analysis templates.

use listwatch_core::{CollectedTweet, TEMPLATE_TWEETS_PLACEHOLDER, TEMPLATE_TWEET_COUNT_PLACEHOLDER};

/// One line per tweet, oldest first: `[i] @author (YYYY-MM-DD HH:MM): text`.
///
/// Newlines inside tweet text are flattened to spaces so each tweet stays on
/// its own line.
#[must_use]
pub fn format_tweets(tweets: &[CollectedTweet]) -> String {
    let mut ordered: Vec<&CollectedTweet> = tweets.iter().collect();
    ordered.sort_by_key(|t| t.created_at);

    ordered
        .iter()
        .enumerate()
        .map(|(i, tweet)| {
            let text = tweet.text.split_whitespace().collect::<Vec<_>>().join(" ");
            format!(
                "[{}] @{} ({}): {}",
                i + 1,
                tweet.author_name,
                tweet.created_at.format("%Y-%m-%d %H:%M"),
                text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitutes both placeholders in `template_prompt`.
#[must_use]
pub fn render_prompt(template_prompt: &str, tweets: &[CollectedTweet]) -> String {
    template_prompt
        .replace(TEMPLATE_TWEETS_PLACEHOLDER, &format_tweets(tweets))
        .replace(TEMPLATE_TWEET_COUNT_PLACEHOLDER, &tweets.len().to_string())
}
