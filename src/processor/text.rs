//! Text-message front end.
//!
//! Recognizes prefixed chat messages, walks the command forest to the deepest
//! matching subcommand and parses the remaining text into arguments.

use super::{ProcessOutcome, Processor, TriggerEvent, convert_arguments};
use crate::context::TriggerKind;
use crate::convert::{ArgumentMap, ConverterContext};
use crate::extension::Extension;
use crate::transport::{Responder, ResolvedData};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct TextProcessor;

#[async_trait]
impl Processor for TextProcessor {
    async fn process(
        &self,
        extension: &Arc<Extension>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome {
        let TriggerEvent::Message(inbound) = event else {
            return ProcessOutcome::Ignored;
        };
        let config = extension.config();
        if config.ignore_bots && inbound.message.author.bot {
            return ProcessOutcome::Ignored;
        }

        let content = inbound.message.content.as_str();
        let Some(stripped) = strip_prefix(content, &config.prefixes, config.case_insensitive)
        else {
            return ProcessOutcome::Ignored;
        };

        // Walk the forest as deep as the leading words allow; the first word
        // that matches no child marks the start of the argument text.
        let table = extension.table();
        let Some((word, mut rest)) = split_word(stripped) else {
            return ProcessOutcome::Ignored;
        };
        let Some(mut command) = table.find_root(word, config.case_insensitive).cloned() else {
            debug!(word, "no command matches prefixed message");
            return ProcessOutcome::Ignored;
        };
        while let Some((word, after)) = split_word(rest) {
            match command.child(word, config.case_insensitive) {
                Some(child) => {
                    command = Arc::clone(child);
                    rest = after;
                }
                None => break,
            }
        }

        // A group reached without a runnable child still enters the executor,
        // which reports it as not executable.
        let arguments = if command.is_group() {
            ArgumentMap::new()
        } else {
            let resolved = ResolvedData::default();
            let mut cx = ConverterContext::for_text(
                &command,
                rest,
                &resolved,
                inbound.guild.as_ref(),
                &inbound.channel,
                extension.fetcher().as_ref(),
            );
            let converters = extension.converters();
            match convert_arguments(&mut cx, &converters).await {
                Ok(arguments) => arguments,
                Err(error) => {
                    let ctx = extension.make_context(
                        TriggerKind::TextMessage,
                        inbound.message.author.clone(),
                        inbound.member.clone(),
                        inbound.channel.clone(),
                        inbound.guild.clone(),
                        command,
                        ArgumentMap::new(),
                        Arc::clone(responder),
                        None,
                    );
                    return ProcessOutcome::Completed(extension.report_failure(ctx, error).await);
                }
            }
        };

        let ctx = extension.make_context(
            TriggerKind::TextMessage,
            inbound.message.author.clone(),
            inbound.member.clone(),
            inbound.channel.clone(),
            inbound.guild.clone(),
            command,
            arguments,
            Arc::clone(responder),
            None,
        );
        ProcessOutcome::Completed(extension.run_invocation(ctx).await)
    }
}

/// Strip the first matching prefix; longest prefixes win.
fn strip_prefix<'a>(content: &'a str, prefixes: &[String], case_insensitive: bool) -> Option<&'a str> {
    let mut ordered: Vec<&String> = prefixes.iter().collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.len()));
    for prefix in ordered {
        if content.len() < prefix.len() || !content.is_char_boundary(prefix.len()) {
            continue;
        }
        let head = &content[..prefix.len()];
        let matched = if case_insensitive {
            head.eq_ignore_ascii_case(prefix)
        } else {
            head == prefix.as_str()
        };
        if matched {
            return Some(&content[prefix.len()..]);
        }
    }
    None
}

/// First whitespace-delimited word and the text after it.
fn split_word(input: &str) -> Option<(&str, &str)> {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find(char::is_whitespace) {
        Some(end) => Some((&trimmed[..end], &trimmed[end..])),
        None => Some((trimmed, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_longest_match_wins() {
        let prefixes = vec!["!".to_string(), "!!".to_string()];
        assert_eq!(strip_prefix("!!ping", &prefixes, false), Some("ping"));
        assert_eq!(strip_prefix("!ping", &prefixes, false), Some("ping"));
        assert_eq!(strip_prefix("ping", &prefixes, false), None);
    }

    #[test]
    fn prefix_case_insensitive() {
        let prefixes = vec!["Bot:".to_string()];
        assert_eq!(strip_prefix("bot: ping", &prefixes, true), Some(" ping"));
        assert_eq!(strip_prefix("bot: ping", &prefixes, false), None);
    }

    #[test]
    fn split_word_handles_tail() {
        assert_eq!(split_word("  config set x"), Some(("config", " set x")));
        assert_eq!(split_word("ping"), Some(("ping", "")));
        assert_eq!(split_word("   "), None);
    }
}
