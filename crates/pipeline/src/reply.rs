//! Sentence batching for the reply streaming pipeline.
//!
//! Streamed reply fragments are held until they form complete sentences,
//! then flushed in batches so synthesis requests are amortized without
//! waiting for the full reply.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sentence terminators that may end a speakable chunk.
const TERMINATORS: [char; 5] = ['.', '!', '?', ':', ';'];

/// Default number of complete sentences batched into one chunk.
pub const DEFAULT_SENTENCE_BATCH_SIZE: usize = 4;

/// Accumulates streamed text fragments into batches of complete sentences.
///
/// Partial sentences are held in a pending buffer and never enqueued;
/// `finish` flushes whatever remains so no reply text is ever dropped.
#[derive(Debug)]
pub struct SentenceBatcher {
    pending: String,
    batch: String,
    sentences: usize,
    batch_size: usize,
}

impl SentenceBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: String::new(),
            batch: String::new(),
            sentences: 0,
            batch_size: batch_size.max(1),
        }
    }

    /// Append a fragment and return every chunk it completes, in order.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);
        let mut chunks = Vec::new();

        // Terminators are ASCII, so the byte after one is a char boundary.
        while let Some(end) = self.pending.find(|c| TERMINATORS.contains(&c)) {
            let tail = self.pending.split_off(end + 1);
            let sentence = std::mem::replace(&mut self.pending, tail);
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                if !self.batch.is_empty() {
                    self.batch.push(' ');
                }
                self.batch.push_str(sentence);
                self.sentences += 1;
            }
            if self.sentences >= self.batch_size {
                self.sentences = 0;
                chunks.push(std::mem::take(&mut self.batch));
            }
        }
        chunks
    }

    /// Flush everything still buffered, including a trailing partial
    /// sentence. `None` only when nothing but whitespace remains.
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.pending.trim();
        if !tail.is_empty() {
            if !self.batch.is_empty() {
                self.batch.push(' ');
            }
            self.batch.push_str(tail);
        }
        self.pending.clear();
        self.sentences = 0;
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// Characters held back awaiting a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Bridge a completion fragment stream into a speech chunk queue.
///
/// Chunks arrive on the returned receiver in enqueue order; the join
/// handle resolves to the full accumulated reply text. Cancelling the
/// token abandons the fragment stream and closes the queue without
/// flushing, so unspoken text is discarded.
pub fn spawn_chunker(
    mut fragments: mpsc::Receiver<String>,
    batch_size: usize,
    cancel: CancellationToken,
) -> (mpsc::Receiver<String>, JoinHandle<String>) {
    let (chunk_tx, chunk_rx) = mpsc::channel(32);
    let handle = tokio::spawn(async move {
        let mut batcher = SentenceBatcher::new(batch_size);
        let mut full = String::new();
        loop {
            let fragment = tokio::select! {
                _ = cancel.cancelled() => break,
                f = fragments.recv() => match f {
                    Some(f) => f,
                    None => break,
                },
            };
            full.push_str(&fragment);
            for chunk in batcher.push(&fragment) {
                if chunk_tx.send(chunk).await.is_err() {
                    return full;
                }
            }
        }
        if cancel.is_cancelled() {
            debug!("reply stream abandoned; pending chunks discarded");
        } else if let Some(rest) = batcher.finish() {
            let _ = chunk_tx.send(rest).await;
        }
        full
    });
    (chunk_rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_batch_flushes_at_size() {
        let mut batcher = SentenceBatcher::new(2);
        assert!(batcher.push("One. ").is_empty());
        let chunks = batcher.push("Two. Three. Four.");
        assert_eq!(chunks, vec!["One. Two.", "Three. Four."]);
        assert!(batcher.finish().is_none());
    }

    #[test]
    fn test_partial_sentence_held_back() {
        let mut batcher = SentenceBatcher::new(1);
        assert!(batcher.push("Hello wor").is_empty());
        let chunks = batcher.push("ld! And mo");
        assert_eq!(chunks, vec!["Hello world!"]);
        assert_eq!(batcher.finish(), Some("And mo".to_string()));
    }

    #[test]
    fn test_all_terminators_recognized() {
        let mut batcher = SentenceBatcher::new(1);
        let chunks = batcher.push("a. b! c? d: e;");
        assert_eq!(chunks, vec!["a.", "b!", "c?", "d:", "e;"]);
    }

    #[test]
    fn test_no_terminator_flushes_on_finish() {
        let mut batcher = SentenceBatcher::new(4);
        assert!(batcher.push("no punctuation at all").is_empty());
        assert_eq!(batcher.finish(), Some("no punctuation at all".to_string()));
    }

    #[test]
    fn test_nothing_is_dropped() {
        let text = "First sentence. Second one! A third? Fourth: fifth; and a trailing fragment";
        let mut batcher = SentenceBatcher::new(4);
        let mut out = Vec::new();
        // Feed in awkward 3-byte fragments, as a token stream would.
        for fragment in text.as_bytes().chunks(3) {
            out.extend(batcher.push(std::str::from_utf8(fragment).unwrap()));
        }
        out.extend(batcher.finish());
        assert_eq!(normalize(&out.join(" ")), normalize(text));
    }

    #[test]
    fn test_whitespace_only_finish_is_none() {
        let mut batcher = SentenceBatcher::new(4);
        batcher.push("   \n ");
        assert!(batcher.finish().is_none());
    }

    #[tokio::test]
    async fn test_chunker_streams_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let (mut chunks, full) = spawn_chunker(rx, 1, CancellationToken::new());

        tx.send("First. Sec".to_string()).await.unwrap();
        tx.send("ond. tail".to_string()).await.unwrap();
        drop(tx);

        assert_eq!(chunks.recv().await.unwrap(), "First.");
        assert_eq!(chunks.recv().await.unwrap(), "Second.");
        assert_eq!(chunks.recv().await.unwrap(), "tail");
        assert!(chunks.recv().await.is_none());
        assert_eq!(full.await.unwrap(), "First. Second. tail");
    }

    #[tokio::test]
    async fn test_cancelled_chunker_discards_pending() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (mut chunks, full) = spawn_chunker(rx, 1, cancel.clone());

        tx.send("Spoken. unfinished tail".to_string()).await.unwrap();
        assert_eq!(chunks.recv().await.unwrap(), "Spoken.");

        cancel.cancel();
        let text = full.await.unwrap();
        assert!(text.starts_with("Spoken."));
        // The unfinished tail is never flushed as a chunk.
        assert!(chunks.recv().await.is_none());
    }
}
