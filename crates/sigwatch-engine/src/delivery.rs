//! Message delivery: segmentation, per-segment retry, concurrent fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::transport::Transport;

/// Split a message into transport-sized segments on char boundaries.
pub fn split_segments(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Deliver all messages to one chat, segment by segment.
///
/// Each segment retries at `retry_interval` until the `lifetime` budget
/// elapses; exhausting the budget logs the failure and moves on to the
/// next segment, so one bad segment never wedges the recipient.
pub async fn deliver_to_chat(
    transport: &dyn Transport,
    chat_id: i64,
    messages: &[String],
    retry_interval: Duration,
    lifetime: Duration,
) {
    for message in messages {
        for segment in split_segments(message, transport.max_message_len()) {
            let started = Instant::now();
            let mut last_error = None;
            loop {
                if started.elapsed() > lifetime {
                    tracing::error!(
                        "❌ Giving up on message to {} after {:?}: {:?}",
                        chat_id,
                        lifetime,
                        last_error
                    );
                    break;
                }
                match transport.send_message(chat_id, &segment).await {
                    Ok(()) => {
                        tracing::info!("✉️ Message sent to {} successfully", chat_id);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Message to {} not sent: {e}", chat_id);
                        last_error = Some(e);
                        tokio::time::sleep(retry_interval).await;
                    }
                }
            }
        }
    }
}

/// Fan the same messages out to every chat concurrently.
///
/// Bounded by the `common` timeout: once it elapses, still-pending
/// deliveries are abandoned (their tasks keep draining their own retry
/// budgets, they are just no longer awaited) and the timeout is logged.
pub async fn fan_out(
    transport: Arc<dyn Transport>,
    chats: Vec<i64>,
    messages: Arc<Vec<String>>,
    retry_interval: Duration,
    lifetime: Duration,
    common: Duration,
) {
    if chats.is_empty() {
        return;
    }
    let tasks: Vec<_> = chats
        .into_iter()
        .map(|chat_id| {
            let transport = Arc::clone(&transport);
            let messages = Arc::clone(&messages);
            tokio::spawn(async move {
                deliver_to_chat(&*transport, chat_id, &messages, retry_interval, lifetime).await;
            })
        })
        .collect();

    if tokio::time::timeout(common, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        tracing::warn!("⏱️ Delivery batch exceeded {:?}; abandoning pending sends", common);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sigwatch_core::SigwatchError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyTransport {
        fail_first: AtomicUsize,
        sent: Mutex<Vec<(i64, String)>>,
        max_len: usize,
    }

    impl FlakyTransport {
        fn new(fail_first: usize, max_len: usize) -> Self {
            Self {
                fail_first: AtomicUsize::new(fail_first),
                sent: Mutex::new(Vec::new()),
                max_len,
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send_message(&self, chat_id: i64, text: &str) -> sigwatch_core::Result<()> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SigwatchError::Transport("flaky".into()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        fn max_message_len(&self) -> usize {
            self.max_len
        }
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(split_segments("short", 10), vec!["short"]);
        let parts = split_segments(&"x".repeat(10), 4);
        assert_eq!(parts, vec!["xxxx", "xxxx", "xx"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let parts = split_segments("ééééé", 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let transport = FlakyTransport::new(2, 4096);
        deliver_to_chat(
            &transport,
            7,
            &["hello".to_string()],
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await;
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (7, "hello".to_string()));
    }

    #[tokio::test]
    async fn test_lifetime_budget_exhausts() {
        let transport = FlakyTransport::new(usize::MAX, 4096);
        deliver_to_chat(
            &transport,
            7,
            &["hello".to_string()],
            Duration::from_millis(1),
            Duration::from_millis(20),
        )
        .await;
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_message_segmented_in_order() {
        let transport = FlakyTransport::new(0, 3);
        deliver_to_chat(
            &transport,
            1,
            &["abcdefg".to_string()],
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
        .await;
        let sent = transport.sent.lock().unwrap();
        let texts: Vec<&str> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_chat() {
        let transport = Arc::new(FlakyTransport::new(0, 4096));
        fan_out(
            transport.clone() as Arc<dyn Transport>,
            vec![1, 2, 3],
            Arc::new(vec!["msg".to_string()]),
            Duration::from_millis(1),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .await;
        let mut chats: Vec<i64> = transport.sent.lock().unwrap().iter().map(|(c, _)| *c).collect();
        chats.sort_unstable();
        assert_eq!(chats, vec![1, 2, 3]);
    }
}
