//! Streaming response construction
//!
//! Native streams wrap each provider fragment in one chunk. Synthetic
//! streams split a complete answer into sentence-sized chunks (word groups
//! for long sentences) and pace them with a fixed delay. In both modes the
//! concatenated chunk contents equal the provider text exactly and only the
//! last chunk carries a finish reason.

use std::iter::Peekable;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use prism_config::StreamingConfig;

use crate::error::LlmError;
use crate::provider::FragmentStream;
use crate::types::{
    CompletionChunk, FinishReason, Role, StreamEvent, StreamFunctionCall, StreamToolCall, ToolCall, Usage,
};

/// Stream of events for one streamed response
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Cadence of synthetic streams
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Pause before every chunk but the first
    pub delay: Duration,
    /// Words per chunk when splitting a long sentence
    pub words_per_chunk: usize,
    /// Longest sentence emitted as one chunk, in characters
    pub max_sentence_chars: usize,
}

impl ChunkPolicy {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.chunk_delay_ms),
            words_per_chunk: config.words_per_chunk.max(1),
            max_sentence_chars: config.max_sentence_chars.max(1),
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}

/// Lazy split of a text into chunk contents
///
/// Each piece ends after a sentence terminator run and the whitespace that
/// follows it. Sentences longer than the policy allows are emitted in word
/// groups, each group keeping its trailing whitespace.
#[derive(Debug)]
pub struct TextChunks {
    text: String,
    pos: usize,
    words_per_chunk: usize,
    max_sentence_chars: usize,
}

impl TextChunks {
    pub fn new(text: impl Into<String>, policy: &ChunkPolicy) -> Self {
        Self {
            text: text.into(),
            pos: 0,
            words_per_chunk: policy.words_per_chunk.max(1),
            max_sentence_chars: policy.max_sentence_chars.max(1),
        }
    }
}

impl Iterator for TextChunks {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        let sentence_len = sentence_end(rest).unwrap_or(rest.len());
        let sentence = &rest[..sentence_len];

        let len = if sentence.chars().count() > self.max_sentence_chars {
            word_group_end(sentence, self.words_per_chunk)
        } else {
            sentence_len
        };

        let piece = rest[..len].to_owned();
        self.pos += len;

        Some(piece)
    }
}

/// Byte length of the first sentence, including the whitespace after it
fn sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        while chars.next_if(|&(_, c)| matches!(c, '.' | '!' | '?')).is_some() {}

        if chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
            return Some(chars.peek().map_or(text.len(), |&(idx, _)| idx));
        }
    }

    None
}

/// Byte length of the first `words` words and their trailing whitespace
fn word_group_end(text: &str, words: usize) -> usize {
    let mut seen = 0;
    let mut in_word = false;

    for (idx, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            if seen == words {
                return idx;
            }
            seen += 1;
        }
    }

    text.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Text,
    Tools,
    Usage,
    Done,
    Finished,
}

/// Event sequence of a synthetic stream
///
/// Text chunks come first, then one chunk per tool call, then the usage
/// event when requested and finally [`StreamEvent::Done`].
#[derive(Debug)]
pub struct SyntheticEvents {
    id: String,
    pieces: Peekable<TextChunks>,
    tool_calls: Peekable<std::iter::Enumerate<std::vec::IntoIter<ToolCall>>>,
    has_tool_calls: bool,
    usage: Option<Usage>,
    role_sent: bool,
    stage: Stage,
}

impl SyntheticEvents {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        usage: Option<Usage>,
        policy: &ChunkPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            pieces: TextChunks::new(text, policy).peekable(),
            has_tool_calls: !tool_calls.is_empty(),
            tool_calls: tool_calls.into_iter().enumerate().peekable(),
            usage,
            role_sent: false,
            stage: Stage::Text,
        }
    }

    fn chunk(&mut self) -> CompletionChunk {
        let mut chunk = CompletionChunk::empty(self.id.clone());
        if !self.role_sent {
            chunk.role = Some(Role::Assistant);
            self.role_sent = true;
        }
        chunk
    }

    fn next_text(&mut self) -> Option<StreamEvent> {
        let Some(piece) = self.pieces.next() else {
            self.stage = Stage::Tools;

            // Empty answer without tool calls still gets one closing chunk
            if !self.role_sent && !self.has_tool_calls {
                let mut chunk = self.chunk();
                chunk.content = Some(String::new());
                chunk.finish_reason = Some(FinishReason::Stop);
                return Some(StreamEvent::Chunk(chunk));
            }

            return None;
        };

        let mut chunk = self.chunk();
        chunk.content = Some(piece);

        if self.pieces.peek().is_none() && !self.has_tool_calls {
            chunk.finish_reason = Some(FinishReason::Stop);
        }

        Some(StreamEvent::Chunk(chunk))
    }

    fn next_tool_call(&mut self) -> Option<StreamEvent> {
        let Some((index, call)) = self.tool_calls.next() else {
            self.stage = Stage::Usage;
            return None;
        };

        let mut chunk = self.chunk();
        chunk.tool_calls = Some(vec![StreamToolCall {
            index: u32::try_from(index).unwrap_or(u32::MAX),
            id: Some(call.id),
            function: Some(StreamFunctionCall {
                name: Some(call.function.name),
                arguments: Some(call.function.arguments),
            }),
        }]);

        if self.tool_calls.peek().is_none() {
            chunk.finish_reason = Some(FinishReason::ToolCalls);
        }

        Some(StreamEvent::Chunk(chunk))
    }
}

impl Iterator for SyntheticEvents {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            let event = match self.stage {
                Stage::Text => self.next_text(),
                Stage::Tools => self.next_tool_call(),
                Stage::Usage => {
                    self.stage = Stage::Done;
                    self.usage.take().map(StreamEvent::Usage)
                }
                Stage::Done => {
                    self.stage = Stage::Finished;
                    Some(StreamEvent::Done)
                }
                Stage::Finished => return None,
            };

            if event.is_some() {
                return event;
            }
        }
    }
}

/// Pace synthetic events into a stream
///
/// The first chunk is yielded without delay; every later chunk waits for
/// the policy delay.
pub fn synthetic(events: SyntheticEvents, delay: Duration) -> EventStream {
    let paced = stream::iter(events.enumerate()).then(move |(idx, event)| async move {
        if idx > 0 && !delay.is_zero() && matches!(event, StreamEvent::Chunk(_)) {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, LlmError>(event)
    });

    Box::pin(paced)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Usage,
    Done,
    Finished,
}

struct NativeState {
    id: String,
    fragments: FragmentStream,
    usage_prompt: Option<String>,
    completion: String,
    role_sent: bool,
    phase: Phase,
}

impl NativeState {
    fn chunk(&mut self) -> CompletionChunk {
        let mut chunk = CompletionChunk::empty(self.id.clone());
        if !self.role_sent {
            chunk.role = Some(Role::Assistant);
            self.role_sent = true;
        }
        chunk
    }
}

/// Wrap provider fragments into chunk events
///
/// The provider stream ends with an empty chunk carrying
/// [`FinishReason::Stop`]. When `usage_prompt` is set, an estimated usage
/// event follows. A provider error is passed through once, followed by
/// [`StreamEvent::Done`].
pub fn native(id: impl Into<String>, fragments: FragmentStream, usage_prompt: Option<String>) -> EventStream {
    let state = NativeState {
        id: id.into(),
        fragments,
        usage_prompt,
        completion: String::new(),
        role_sent: false,
        phase: Phase::Streaming,
    };

    let events = stream::unfold(state, |mut state| async move {
        match state.phase {
            Phase::Streaming => loop {
                match state.fragments.next().await {
                    Some(Ok(text)) if text.is_empty() => {}
                    Some(Ok(text)) => {
                        if state.usage_prompt.is_some() {
                            state.completion.push_str(&text);
                        }

                        let mut chunk = state.chunk();
                        chunk.content = Some(text);
                        return Some((Ok(StreamEvent::Chunk(chunk)), state));
                    }
                    Some(Err(e)) => {
                        state.phase = Phase::Done;
                        return Some((Err(e), state));
                    }
                    None => {
                        state.phase = Phase::Usage;

                        let mut chunk = state.chunk();
                        chunk.finish_reason = Some(FinishReason::Stop);
                        return Some((Ok(StreamEvent::Chunk(chunk)), state));
                    }
                }
            },
            Phase::Usage => {
                if let Some(prompt) = state.usage_prompt.take() {
                    state.phase = Phase::Done;
                    let usage = Usage::estimate(&prompt, &state.completion);
                    return Some((Ok(StreamEvent::Usage(usage)), state));
                }

                state.phase = Phase::Finished;
                Some((Ok(StreamEvent::Done), state))
            }
            Phase::Done => {
                state.phase = Phase::Finished;
                Some((Ok(StreamEvent::Done), state))
            }
            Phase::Finished => None,
        }
    });

    Box::pin(events)
}
