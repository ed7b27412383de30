use crate::error::MediaError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Where local camera/microphone tracks come from. Device capture itself
/// lives outside this crate; the orchestrator only ever sees this seam, which
/// is what lets tests run without hardware.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<Arc<LocalMedia>, MediaError>;
}

/// A source that hands out one pre-built track pair. Useful when the
/// application owns capture and for tests.
pub struct StaticMediaSource {
    media: Arc<LocalMedia>,
}

impl StaticMediaSource {
    pub fn new(media: Arc<LocalMedia>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl MediaSource for StaticMediaSource {
    async fn acquire(&self) -> Result<Arc<LocalMedia>, MediaError> {
        Ok(self.media.clone())
    }
}

/// The local microphone+camera track pair attached to a call.
///
/// The enable flags are the thin mute/camera-off toggles: flipping one gates
/// sample writing without any renegotiation. `stop` is the end of the tracks'
/// life and is safe to call any number of times.
pub struct LocalMedia {
    audio: Arc<TrackLocalStaticSample>,
    video: Arc<TrackLocalStaticSample>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalMedia {
    pub fn new(audio: Arc<TrackLocalStaticSample>, video: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            audio,
            video,
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Standard Opus + VP8 pair, the capabilities every supported browser and
    /// the default media engine agree on.
    pub fn track_pair(stream_id: &str) -> Self {
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.to_owned(),
        ));
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            stream_id.to_owned(),
        ));
        Self::new(audio, video)
    }

    pub fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        vec![self.audio.clone(), self.video.clone()]
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    /// Feed one captured audio sample; silently skipped while muted or
    /// stopped.
    pub async fn write_audio_sample(&self, sample: &Sample) -> Result<(), webrtc::Error> {
        if self.is_stopped() || !self.is_audio_enabled() {
            return Ok(());
        }
        self.audio.write_sample(sample).await
    }

    /// Feed one captured video sample; silently skipped while the camera is
    /// off or the media is stopped.
    pub async fn write_video_sample(&self, sample: &Sample) -> Result<(), webrtc::Error> {
        if self.is_stopped() || !self.is_video_enabled() {
            return Ok(());
        }
        self.video.write_sample(sample).await
    }

    /// Release the tracks. Idempotent; runs on every exit path.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
