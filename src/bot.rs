use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::camera::{Camera, CameraControl};
use crate::youtube::ChatFeed;

const CMD_LIST_CAMERAS: &str = "list cameras";
const CMD_ACTIVE_CAMERA: &str = "active camera";
const CMD_SELECT_PREFIX: &str = "select camera";

const NO_CAMERAS_REPLY: &str = "no cameras available";
const NO_ACTIVE_REPLY: &str = "no camera currently active";

/// Posted once at startup, one chat message per line.
const WELCOME_BANNER: [&str; 4] = [
    "Camera bot is online.",
    "Commands: list cameras | active camera | select camera <name>",
    "Replies are posted here in chat.",
    "Have a good stream!",
];

/// The poll-and-dispatch loop. Owns the continuation token and the cached
/// camera list; nothing else touches them.
pub struct Bot<C, F> {
    camera: C,
    chat: F,
    chat_id: String,
    cameras: Vec<Camera>,
    page_token: String,
    poll_interval: Duration,
}

impl<C: CameraControl, F: ChatFeed> Bot<C, F> {
    pub fn new(camera: C, chat: F, chat_id: String, poll_interval: Duration) -> Self {
        Self {
            camera,
            chat,
            chat_id,
            cameras: Vec::new(),
            page_token: String::new(),
            poll_interval,
        }
    }

    pub async fn send_welcome(&self) -> Result<()> {
        for line in WELCOME_BANNER {
            self.chat.send_message(&self.chat_id, line).await?;
        }
        Ok(())
    }

    /// Poll, dispatch, sleep, forever. Chat-provider errors propagate to the
    /// caller, which treats them as fatal.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Entering poll loop ({}s between polls)",
            self.poll_interval.as_secs()
        );
        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll cycle: fetch the next batch, thread the continuation token,
    /// act on at most one command.
    pub async fn poll_once(&mut self) -> Result<()> {
        let batch = self
            .chat
            .next_batch(&self.chat_id, &self.page_token)
            .await?;
        self.page_token = batch.next_token;

        // Newest first; the first recognized command wins and older ones in
        // the same batch are dropped.
        for message in batch.messages.iter().rev() {
            if self.dispatch(&message.text).await? {
                break;
            }
        }

        Ok(())
    }

    /// Returns true when the text was a recognized command.
    async fn dispatch(&mut self, text: &str) -> Result<bool> {
        if text == CMD_LIST_CAMERAS {
            info!("Command: list cameras");
            self.refresh_cameras().await;
            let reply = render_camera_list(&self.cameras);
            self.chat.send_message(&self.chat_id, &reply).await?;
            return Ok(true);
        }

        if text == CMD_ACTIVE_CAMERA {
            info!("Command: active camera");
            let active = match self.camera.get_active().await {
                Ok(active) => active,
                Err(e) => {
                    warn!("Failed to query active camera: {:#}", e);
                    None
                }
            };
            let reply = match active {
                Some(camera) => format!("{} ({})", camera.name, camera.kind),
                None => NO_ACTIVE_REPLY.to_string(),
            };
            self.chat.send_message(&self.chat_id, &reply).await?;
            return Ok(true);
        }

        if text.starts_with(CMD_SELECT_PREFIX) {
            info!("Command: {}", text);
            self.refresh_cameras().await;
            // First camera (list order) whose stored name appears in the
            // command text; the select call carries the stored name.
            if let Some(camera) = self.cameras.iter().find(|c| text.contains(&c.name)) {
                info!("Switching to camera: {}", camera.name);
                if let Err(e) = self.camera.select_camera(&camera.name).await {
                    warn!("Failed to select camera {}: {:#}", camera.name, e);
                }
            } else {
                warn!("No camera matches command: {}", text);
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Camera-server failures degrade to an empty list; never fatal.
    async fn refresh_cameras(&mut self) {
        match self.camera.list_cameras().await {
            Ok(cameras) => self.cameras = cameras,
            Err(e) => {
                warn!("Failed to fetch camera list: {:#}", e);
                self.cameras.clear();
            }
        }
    }
}

fn render_camera_list(cameras: &[Camera]) -> String {
    if cameras.is_empty() {
        return NO_CAMERAS_REPLY.to_string();
    }

    let mut out = String::new();
    for (i, camera) in cameras.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{}) {} ({})", i + 1, camera.name, camera.kind));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraKind;
    use crate::youtube::{ChatBatch, ChatMessage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct MockCamera {
        cameras: Vec<Camera>,
        active: Option<Camera>,
        fail_list: bool,
        selected: Arc<Mutex<Vec<String>>>,
    }

    impl MockCamera {
        fn new(cameras: Vec<Camera>) -> Self {
            Self {
                cameras,
                active: None,
                fail_list: false,
                selected: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl CameraControl for MockCamera {
        async fn list_cameras(&self) -> Result<Vec<Camera>> {
            if self.fail_list {
                anyhow::bail!("connection refused");
            }
            Ok(self.cameras.clone())
        }

        async fn get_active(&self) -> Result<Option<Camera>> {
            Ok(self.active.clone())
        }

        async fn select_camera(&self, name: &str) -> Result<()> {
            self.selected.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn announce_broadcast(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    struct MockChat {
        batches: Mutex<VecDeque<ChatBatch>>,
        tokens_seen: Arc<Mutex<Vec<String>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl MockChat {
        fn new(batches: Vec<ChatBatch>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                tokens_seen: Arc::new(Mutex::new(Vec::new())),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ChatFeed for MockChat {
        async fn next_batch(&self, _chat_id: &str, page_token: &str) -> Result<ChatBatch> {
            self.tokens_seen
                .lock()
                .unwrap()
                .push(page_token.to_string());
            Ok(self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ChatBatch {
                    next_token: String::new(),
                    messages: Vec::new(),
                }))
        }

        async fn send_message(&self, _chat_id: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn camera(name: &str, kind: CameraKind) -> Camera {
        Camera {
            name: name.to_string(),
            kind,
        }
    }

    fn batch(token: &str, texts: &[&str]) -> ChatBatch {
        ChatBatch {
            next_token: token.to_string(),
            messages: texts
                .iter()
                .map(|t| ChatMessage {
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    fn make_bot(cameras: MockCamera, chat: MockChat) -> Bot<MockCamera, MockChat> {
        Bot::new(cameras, chat, "chat-1".to_string(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_only_newest_command_in_batch_takes_effect() {
        // Provider order: oldest first. The stale "list cameras" must be
        // dropped in favor of the newer "active camera".
        let chat = MockChat::new(vec![batch(
            "tok",
            &["list cameras", "just chatting", "active camera"],
        )]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(MockCamera::new(vec![camera("Front", CameraKind::Rtsp)]), chat);

        bot.poll_once().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.as_slice(), [NO_ACTIVE_REPLY]);
    }

    #[tokio::test]
    async fn test_select_camera_sends_stored_name() {
        let cameras = MockCamera::new(vec![
            camera("Back", CameraKind::Webcam),
            camera("Front", CameraKind::Rtsp),
        ]);
        let selected = cameras.selected.clone();
        let chat = MockChat::new(vec![batch("", &["select camera Front"])]);
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        assert_eq!(selected.lock().unwrap().as_slice(), ["Front"]);
    }

    #[tokio::test]
    async fn test_ambiguous_select_takes_first_in_list_order() {
        let cameras = MockCamera::new(vec![
            camera("Front", CameraKind::Rtsp),
            camera("Front Left", CameraKind::Rtsp),
        ]);
        let selected = cameras.selected.clone();
        let chat = MockChat::new(vec![batch("", &["select camera Front Left"])]);
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        // "Front" is also a substring of the command text and comes first.
        assert_eq!(selected.lock().unwrap().as_slice(), ["Front"]);
    }

    #[tokio::test]
    async fn test_select_with_no_match_selects_nothing() {
        let cameras = MockCamera::new(vec![camera("Front", CameraKind::Rtsp)]);
        let selected = cameras.selected.clone();
        let chat = MockChat::new(vec![batch("", &["select camera Garden"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        assert!(selected.lock().unwrap().is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_cameras_reply() {
        let cameras = MockCamera::new(vec![
            camera("Front", CameraKind::Rtsp),
            camera("Desk", CameraKind::Webcam),
        ]);
        let chat = MockChat::new(vec![batch("", &["list cameras"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        assert_eq!(
            sent.lock().unwrap().as_slice(),
            ["1) Front (RTSP)\n2) Desk (Webcam)"]
        );
    }

    #[tokio::test]
    async fn test_empty_camera_list_reply() {
        let chat = MockChat::new(vec![batch("", &["list cameras"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(MockCamera::new(Vec::new()), chat);

        bot.poll_once().await.unwrap();

        assert_eq!(sent.lock().unwrap().as_slice(), [NO_CAMERAS_REPLY]);
    }

    #[tokio::test]
    async fn test_camera_server_failure_is_not_fatal() {
        let mut cameras = MockCamera::new(vec![camera("Front", CameraKind::Rtsp)]);
        cameras.fail_list = true;
        let chat = MockChat::new(vec![batch("", &["list cameras"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        assert_eq!(sent.lock().unwrap().as_slice(), [NO_CAMERAS_REPLY]);
    }

    #[tokio::test]
    async fn test_active_camera_reply() {
        let mut cameras = MockCamera::new(Vec::new());
        cameras.active = Some(camera("Front", CameraKind::Rtsp));
        let chat = MockChat::new(vec![batch("", &["active camera"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(cameras, chat);

        bot.poll_once().await.unwrap();

        assert_eq!(sent.lock().unwrap().as_slice(), ["Front (RTSP)"]);
    }

    #[tokio::test]
    async fn test_no_active_camera_reply() {
        let chat = MockChat::new(vec![batch("", &["active camera"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(MockCamera::new(Vec::new()), chat);

        bot.poll_once().await.unwrap();

        assert_eq!(sent.lock().unwrap().as_slice(), [NO_ACTIVE_REPLY]);
    }

    #[tokio::test]
    async fn test_continuation_token_is_threaded_unchanged() {
        let chat = MockChat::new(vec![batch("tok-1", &[]), batch("tok-2", &[])]);
        let tokens = chat.tokens_seen.clone();
        let mut bot = make_bot(MockCamera::new(Vec::new()), chat);

        bot.poll_once().await.unwrap();
        bot.poll_once().await.unwrap();
        bot.poll_once().await.unwrap();

        assert_eq!(tokens.lock().unwrap().as_slice(), ["", "tok-1", "tok-2"]);
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_ignored() {
        let chat = MockChat::new(vec![batch("", &["hello", "camera please", "select"])]);
        let sent = chat.sent.clone();
        let mut bot = make_bot(MockCamera::new(Vec::new()), chat);

        bot.poll_once().await.unwrap();

        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_welcome_banner_is_four_lines() {
        let chat = MockChat::new(Vec::new());
        let sent = chat.sent.clone();
        let bot = make_bot(MockCamera::new(Vec::new()), chat);

        bot.send_welcome().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], "Camera bot is online.");
    }

    #[test]
    fn test_render_camera_list() {
        let cameras = vec![
            camera("Front", CameraKind::Rtsp),
            camera("Desk cam", CameraKind::Webcam),
        ];
        assert_eq!(
            render_camera_list(&cameras),
            "1) Front (RTSP)\n2) Desk cam (Webcam)"
        );
        assert_eq!(render_camera_list(&[]), NO_CAMERAS_REPLY);
    }
}
