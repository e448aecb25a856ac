use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;

use super::Middleware;
use crate::errors::{GenerateError, GenerateResult};
use crate::providers::base::{
    CallOptions, LanguageModel, ModelEvent, ModelEventStream, ModelResponse, ReasoningOutput,
};

/// Moves `<tag>...</tag>` sections out of generated text into reasoning.
///
/// For models that emit their deliberation inline, e.g. `<think>` blocks.
#[derive(Debug, Clone)]
pub struct ExtractReasoning {
    tag_name: String,
    separator: String,
    start_with_reasoning: bool,
}

impl ExtractReasoning {
    pub fn new<S: Into<String>>(tag_name: S) -> Self {
        Self {
            tag_name: tag_name.into(),
            separator: "\n".to_string(),
            start_with_reasoning: false,
        }
    }

    /// Joins sections of reasoning and the text left around removed sections
    pub fn with_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = separator.into();
        self
    }

    /// Treat output as reasoning until the first closing tag, for models that
    /// put the opening tag in the prompt
    pub fn starting_with_reasoning(mut self) -> Self {
        self.start_with_reasoning = true;
        self
    }

    fn opening_tag(&self) -> String {
        format!("<{}>", self.tag_name)
    }

    fn closing_tag(&self) -> String {
        format!("</{}>", self.tag_name)
    }

    /// Returns the joined reasoning, if any, and the remaining text.
    fn split(&self, text: &str) -> GenerateResult<(Option<String>, String)> {
        let pattern = format!(
            "(?s){}(.*?){}",
            regex::escape(&self.opening_tag()),
            regex::escape(&self.closing_tag())
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| GenerateError::invalid_argument("tag_name", e.to_string()))?;

        let sections: Vec<_> = regex.captures_iter(text).collect();
        if sections.is_empty() {
            return Ok((None, text.to_string()));
        }

        let reasoning = sections
            .iter()
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join(&self.separator);

        let mut remaining = text.to_string();
        for caps in sections.iter().rev() {
            let Some(section) = caps.get(0) else { continue };
            let before = &remaining[..section.start()];
            let after = &remaining[section.end()..];
            let joiner = if before.is_empty() || after.is_empty() {
                ""
            } else {
                self.separator.as_str()
            };
            remaining = format!("{before}{joiner}{after}");
        }

        Ok((Some(reasoning), remaining))
    }
}

#[async_trait]
impl Middleware for ExtractReasoning {
    async fn wrap_generate(
        &self,
        model: &dyn LanguageModel,
        options: &CallOptions,
    ) -> GenerateResult<ModelResponse> {
        let mut response = model.generate(options).await?;
        let Some(text) = response.text.as_deref() else {
            return Ok(response);
        };

        let tagged = if self.start_with_reasoning {
            format!("{}{}", self.opening_tag(), text)
        } else {
            text.to_string()
        };
        if let (Some(reasoning), remaining) = self.split(&tagged)? {
            response.text = Some(remaining);
            response.reasoning.push(ReasoningOutput::Text {
                text: reasoning,
                signature: None,
            });
        }
        Ok(response)
    }

    async fn wrap_stream(
        &self,
        model: &dyn LanguageModel,
        options: &CallOptions,
    ) -> GenerateResult<ModelEventStream> {
        let mut inner = model.stream(options).await?;
        let mut splitter = TagSplitter::new(self);

        Ok(stream! {
            while let Some(event) = inner.next().await {
                match event {
                    Ok(ModelEvent::TextDelta(delta)) => {
                        for event in splitter.push(&delta) {
                            yield Ok(event);
                        }
                    }
                    Ok(finish @ ModelEvent::Finish { .. }) => {
                        for event in splitter.flush() {
                            yield Ok(event);
                        }
                        yield Ok(finish);
                    }
                    other => yield other,
                }
            }
            for event in splitter.flush() {
                yield Ok(event);
            }
        }
        .boxed())
    }
}

/// Incremental tag matching over text deltas. A tag may be split across any
/// number of deltas, so a possible tag prefix at the end of the buffer is held
/// back until the next delta decides it.
struct TagSplitter {
    opening_tag: String,
    closing_tag: String,
    separator: String,
    buffer: String,
    in_reasoning: bool,
    after_switch: bool,
    emitted_reasoning: bool,
    emitted_text: bool,
}

impl TagSplitter {
    fn new(config: &ExtractReasoning) -> Self {
        Self {
            opening_tag: config.opening_tag(),
            closing_tag: config.closing_tag(),
            separator: config.separator.clone(),
            buffer: String::new(),
            in_reasoning: config.start_with_reasoning,
            after_switch: false,
            emitted_reasoning: false,
            emitted_text: false,
        }
    }

    fn push(&mut self, delta: &str) -> Vec<ModelEvent> {
        self.buffer.push_str(delta);
        let mut events = Vec::new();
        loop {
            let tag = if self.in_reasoning {
                self.closing_tag.clone()
            } else {
                self.opening_tag.clone()
            };
            match potential_start(&self.buffer, &tag) {
                None => {
                    let rest = std::mem::take(&mut self.buffer);
                    self.publish(rest, &mut events);
                    break;
                }
                Some(index) => {
                    let head = self.buffer[..index].to_string();
                    self.publish(head, &mut events);
                    if index + tag.len() <= self.buffer.len() {
                        self.buffer.drain(..index + tag.len());
                        self.in_reasoning = !self.in_reasoning;
                        self.after_switch = true;
                    } else {
                        self.buffer.drain(..index);
                        break;
                    }
                }
            }
        }
        events
    }

    fn flush(&mut self) -> Vec<ModelEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.publish(rest, &mut events);
        events
    }

    fn publish(&mut self, text: String, events: &mut Vec<ModelEvent>) {
        if text.is_empty() {
            return;
        }
        let emitted_before = if self.in_reasoning {
            self.emitted_reasoning
        } else {
            self.emitted_text
        };
        let text = if self.after_switch && emitted_before {
            format!("{}{}", self.separator, text)
        } else {
            text
        };

        if self.in_reasoning {
            events.push(ModelEvent::ReasoningDelta(text));
            self.emitted_reasoning = true;
        } else {
            events.push(ModelEvent::TextDelta(text));
            self.emitted_text = true;
        }
        self.after_switch = false;
    }
}

/// Index where `search` starts in `text`, or where a suffix of `text` that is
/// a prefix of `search` starts.
fn potential_start(text: &str, search: &str) -> Option<usize> {
    if search.is_empty() {
        return None;
    }
    if let Some(index) = text.find(search) {
        return Some(index);
    }
    (0..text.len()).find(|&i| text.is_char_boundary(i) && search.starts_with(&text[i..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::wrap_model;
    use crate::providers::base::{FinishReason, Usage};
    use crate::providers::mock::{MockLanguageModel, MockTurn};
    use futures::TryStreamExt;
    use std::sync::Arc;

    #[test]
    fn test_potential_start() {
        assert_eq!(potential_start("abc<think>", "<think>"), Some(3));
        assert_eq!(potential_start("abc<thi", "<think>"), Some(3));
        assert_eq!(potential_start("abc", "<think>"), None);
        assert_eq!(potential_start("", "<think>"), None);
    }

    #[tokio::test]
    async fn test_generate_extracts_every_section() -> anyhow::Result<()> {
        let mock = MockLanguageModel::new(vec![ModelResponse::text(
            "a<think>x</think>b<think>y</think>c",
        )]);
        let model = wrap_model(Arc::new(mock), vec![Arc::new(ExtractReasoning::new("think"))]);

        let response = model.generate(&CallOptions::default()).await?;
        assert_eq!(response.text.as_deref(), Some("a\nb\nc"));
        assert_eq!(
            response.reasoning,
            vec![ReasoningOutput::Text {
                text: "x\ny".to_string(),
                signature: None
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_without_tags_is_untouched() -> anyhow::Result<()> {
        let mock = MockLanguageModel::new(vec![ModelResponse::text("plain answer")]);
        let model = wrap_model(Arc::new(mock), vec![Arc::new(ExtractReasoning::new("think"))]);

        let response = model.generate(&CallOptions::default()).await?;
        assert_eq!(response.text.as_deref(), Some("plain answer"));
        assert!(response.reasoning.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_starting_with_reasoning() -> anyhow::Result<()> {
        let mock = MockLanguageModel::new(vec![ModelResponse::text("plan</think>Answer")]);
        let middleware = ExtractReasoning::new("think").starting_with_reasoning();
        let model = wrap_model(Arc::new(mock), vec![Arc::new(middleware)]);

        let response = model.generate(&CallOptions::default()).await?;
        assert_eq!(response.text.as_deref(), Some("Answer"));
        assert_eq!(response.reasoning.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_handles_tags_split_across_deltas() -> anyhow::Result<()> {
        let deltas = ["<thi", "nk>plan", "</think>Ans", "wer"];
        let mut events: Vec<GenerateResult<ModelEvent>> = deltas
            .iter()
            .map(|d| Ok(ModelEvent::TextDelta(d.to_string())))
            .collect();
        events.push(Ok(ModelEvent::Finish {
            finish_reason: FinishReason::Stop,
            usage: Usage::new(1, 1),
            provider_metadata: None,
        }));
        let mock = MockLanguageModel::with_turns(vec![MockTurn::Events(events)]);
        let model = wrap_model(Arc::new(mock), vec![Arc::new(ExtractReasoning::new("think"))]);

        let events: Vec<ModelEvent> = model
            .stream(&CallOptions::default())
            .await?
            .try_collect()
            .await?;
        assert_eq!(
            events,
            vec![
                ModelEvent::ReasoningDelta("plan".to_string()),
                ModelEvent::TextDelta("Ans".to_string()),
                ModelEvent::TextDelta("wer".to_string()),
                ModelEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    usage: Usage::new(1, 1),
                    provider_metadata: None,
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_separates_text_around_sections() -> anyhow::Result<()> {
        let mock = MockLanguageModel::with_turns(vec![MockTurn::Events(vec![
            Ok(ModelEvent::TextDelta("a<think>x</think>b".to_string())),
            Ok(ModelEvent::TextDelta("<think>y</think>c<".to_string())),
        ])]);
        let model = wrap_model(Arc::new(mock), vec![Arc::new(ExtractReasoning::new("think"))]);

        let events: Vec<ModelEvent> = model
            .stream(&CallOptions::default())
            .await?
            .try_collect()
            .await?;
        let mut text = String::new();
        let mut reasoning = String::new();
        for event in events {
            match event {
                ModelEvent::TextDelta(delta) => text.push_str(&delta),
                ModelEvent::ReasoningDelta(delta) => reasoning.push_str(&delta),
                _ => {}
            }
        }
        // The trailing `<` is held back as a possible tag, then flushed at the end.
        assert_eq!(text, "a\nb\nc<");
        assert_eq!(reasoning, "x\ny");
        Ok(())
    }
}
