use crate::config::CallConfig;
use crate::connection::{LinkEvent, PeerLink};
use crate::error::{CallError, SignalingError};
use crate::media::{LocalMedia, MediaSource};
use crate::signaling::SignalingChannel;
use crate::state::{CallRole, CallState, CallStatus};
use std::ops::ControlFlow;
use std::sync::Arc;
use telecare_core::{CandidateInit, ClientMessage, ParticipantId, ServerMessage, SessionKey};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::track::track_remote::TrackRemote;

/// Requests the surrounding application can make against a running call.
#[derive(Debug)]
pub enum CallCommand {
    HangUp,
    SetAudioEnabled(bool),
    SetVideoEnabled(bool),
}

/// The application's grip on a call: status/stream observers plus the command
/// side. Dropping the handle hangs up.
pub struct CallHandle {
    command_tx: mpsc::Sender<CallCommand>,
    status_rx: watch::Receiver<CallStatus>,
    local_rx: watch::Receiver<Option<Arc<LocalMedia>>>,
    remote_rx: watch::Receiver<Vec<Arc<TrackRemote>>>,
}

impl CallHandle {
    pub fn status(&self) -> CallStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CallStatus> {
        self.status_rx.clone()
    }

    pub fn local_media(&self) -> Option<Arc<LocalMedia>> {
        self.local_rx.borrow().clone()
    }

    pub fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.remote_rx.borrow().clone()
    }

    pub fn subscribe_remote(&self) -> watch::Receiver<Vec<Arc<TrackRemote>>> {
        self.remote_rx.clone()
    }

    /// End the call. Safe to invoke any number of times; once the
    /// orchestrator is gone this is a no-op.
    pub async fn hang_up(&self) {
        let _ = self.command_tx.send(CallCommand::HangUp).await;
    }

    pub async fn set_audio_enabled(&self, enabled: bool) {
        let _ = self
            .command_tx
            .send(CallCommand::SetAudioEnabled(enabled))
            .await;
    }

    pub async fn set_video_enabled(&self, enabled: bool) {
        let _ = self
            .command_tx
            .send(CallCommand::SetVideoEnabled(enabled))
            .await;
    }
}

/// Drives one participant's side of a consultation call: acquires media,
/// joins the session, runs the offer/answer/candidate handshake with a
/// deterministic initiator, recovers from path degradation, and releases
/// everything on the way out.
///
/// One instance is one logical actor; all of its state lives on this struct
/// and is touched only from [`run`](Self::run).
pub struct Orchestrator {
    session_key: SessionKey,
    config: CallConfig,
    media_source: Arc<dyn MediaSource>,
    signaling: Box<dyn SignalingChannel>,

    command_rx: mpsc::Receiver<CallCommand>,
    status_tx: watch::Sender<CallStatus>,
    local_tx: watch::Sender<Option<Arc<LocalMedia>>>,
    remote_tx: watch::Sender<Vec<Arc<TrackRemote>>>,

    link_tx: mpsc::Sender<(u64, LinkEvent)>,
    link_rx: mpsc::Receiver<(u64, LinkEvent)>,
    link: Option<PeerLink>,
    next_generation: u64,

    media: Option<Arc<LocalMedia>>,
    role: Option<CallRole>,
    peer: Option<ParticipantId>,
    /// Remote candidates that arrived before the remote description; applied
    /// as soon as it is set instead of being dropped.
    pending_candidates: Vec<CandidateInit>,
    attempts: u32,
    grace_at: Option<Instant>,
    retry_at: Option<Instant>,
    torn_down: bool,
}

impl Orchestrator {
    pub fn new(
        session_key: SessionKey,
        signaling: Box<dyn SignalingChannel>,
        media_source: Arc<dyn MediaSource>,
        config: CallConfig,
    ) -> (Self, CallHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(CallStatus::idle());
        let (local_tx, local_rx) = watch::channel(None);
        let (remote_tx, remote_rx) = watch::channel(Vec::new());
        let (link_tx, link_rx) = mpsc::channel(64);

        let orchestrator = Self {
            session_key,
            config,
            media_source,
            signaling,
            command_rx,
            status_tx,
            local_tx,
            remote_tx,
            link_tx,
            link_rx,
            link: None,
            next_generation: 0,
            media: None,
            role: None,
            peer: None,
            pending_candidates: Vec::new(),
            attempts: 0,
            grace_at: None,
            retry_at: None,
            torn_down: false,
        };
        let handle = CallHandle {
            command_tx,
            status_rx,
            local_rx,
            remote_rx,
        };
        (orchestrator, handle)
    }

    /// Event loop. Runs until hang-up, signaling loss, or terminal failure;
    /// every exit path goes through [`teardown`](Self::teardown).
    pub async fn run(mut self) {
        self.set_state(CallState::AcquiringMedia, None);
        match self.media_source.acquire().await {
            Ok(media) => {
                self.media = Some(media.clone());
                let _ = self.local_tx.send(Some(media));
                self.set_state(CallState::Joining, None);
            }
            Err(e) => {
                warn!("media acquisition failed: {e}");
                self.set_state(CallState::MediaUnavailable, Some(e.to_string()));
            }
        }

        // Join even without media: the peer's arrival is what triggers the
        // acquisition retry.
        if self
            .signaling
            .send(ClientMessage::JoinRoom {
                session_key: self.session_key.clone(),
            })
            .await
            .is_err()
        {
            self.teardown(
                CallState::Closed,
                Some(CallError::from(SignalingError::Closed).to_string()),
            )
            .await;
            return;
        }
        if self.media.is_some() {
            self.set_state(CallState::WaitingForPeer, None);
        }

        loop {
            let grace_at = self.grace_at;
            let retry_at = self.retry_at;

            let flow = tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(CallCommand::HangUp) | None => {
                        self.teardown(CallState::Closed, None).await;
                        ControlFlow::Break(())
                    }
                    Some(CallCommand::SetAudioEnabled(enabled)) => {
                        if let Some(media) = &self.media {
                            media.set_audio_enabled(enabled);
                        }
                        ControlFlow::Continue(())
                    }
                    Some(CallCommand::SetVideoEnabled(enabled)) => {
                        if let Some(media) = &self.media {
                            media.set_video_enabled(enabled);
                        }
                        ControlFlow::Continue(())
                    }
                },
                message = self.signaling.recv() => match message {
                    Some(message) => self.handle_signal(message).await,
                    None => {
                        self.teardown(
                            CallState::Closed,
                            Some(CallError::from(SignalingError::Closed).to_string()),
                        )
                        .await;
                        ControlFlow::Break(())
                    }
                },
                event = self.link_rx.recv() => match event {
                    Some((generation, event)) => self.handle_link_event(generation, event).await,
                    None => ControlFlow::Continue(()),
                },
                _ = sleep_until_opt(grace_at), if grace_at.is_some() => {
                    self.grace_at = None;
                    self.on_grace_expired().await
                }
                _ = sleep_until_opt(retry_at), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.begin_round().await
                }
            };

            if flow.is_break() {
                break;
            }
        }
    }

    fn state(&self) -> CallState {
        self.status_tx.borrow().state
    }

    fn set_state(&self, state: CallState, last_error: Option<String>) {
        debug!(?state, session = %self.session_key, "call state changed");
        self.status_tx.send_modify(|status| {
            status.state = state;
            if last_error.is_some() {
                status.last_error = last_error.clone();
            }
        });
    }

    async fn handle_signal(&mut self, message: ServerMessage) -> ControlFlow<()> {
        match message {
            ServerMessage::Welcome { participant_id } => {
                debug!(id = %participant_id, "assigned connection id");
                ControlFlow::Continue(())
            }
            ServerMessage::IceConfig { ice_servers } => {
                // Locally configured servers win; the relay's list fills the gap.
                if self.config.ice_servers.is_empty() {
                    self.config.ice_servers = ice_servers;
                }
                ControlFlow::Continue(())
            }
            ServerMessage::UserJoined { peer_id } => {
                info!(peer = %peer_id, "peer joined; this side initiates");
                self.role = Some(CallRole::Initiator);
                self.peer = Some(peer_id);
                self.attempts = 0;
                self.retry_at = None;
                self.begin_round().await
            }
            ServerMessage::Offer { from, payload } => {
                if self.peer.as_ref().is_some_and(|peer| peer != &from) {
                    debug!(from = %from, "offer from unexpected sender dropped");
                    return ControlFlow::Continue(());
                }

                // An offer while the path is degraded is the initiator's ICE
                // restart; answer it on the live link. Any other offer is a
                // fresh round and gets a fresh connection object, even when
                // the old one has not reported failure here yet.
                if self.state() == CallState::Degraded
                    && let Some(link) = &self.link
                {
                    info!(from = %from, "ice restart offer received");
                    match link.apply_remote_offer(payload).await {
                        Ok(answer) => {
                            self.flush_pending_candidates().await;
                            self.set_state(CallState::Negotiating, None);
                            return self
                                .send_signal(ClientMessage::Answer {
                                    target: from,
                                    payload: answer,
                                })
                                .await;
                        }
                        Err(e) => return self.on_round_failed(e.to_string()).await,
                    }
                }

                info!(peer = %from, "offer received; this side responds");
                self.role = Some(CallRole::Responder);
                self.peer = Some(from.clone());
                if !self.ensure_media().await {
                    return ControlFlow::Continue(());
                }
                match self.open_link().await {
                    Ok(()) => {}
                    Err(e) => return self.on_round_failed(e.to_string()).await,
                }
                let link = self.link.as_ref().unwrap_or_else(|| unreachable!());
                match link.apply_remote_offer(payload).await {
                    Ok(answer) => {
                        self.flush_pending_candidates().await;
                        self.set_state(CallState::Negotiating, None);
                        self.send_signal(ClientMessage::Answer {
                            target: from,
                            payload: answer,
                        })
                        .await
                    }
                    Err(e) => self.on_round_failed(e.to_string()).await,
                }
            }
            ServerMessage::Answer { from, payload } => {
                if self.role != Some(CallRole::Initiator)
                    || self.peer.as_ref() != Some(&from)
                    || self.link.is_none()
                {
                    debug!(from = %from, "unexpected answer dropped");
                    return ControlFlow::Continue(());
                }
                let link = self.link.as_ref().unwrap_or_else(|| unreachable!());
                match link.apply_remote_answer(payload).await {
                    Ok(()) => {
                        self.flush_pending_candidates().await;
                        ControlFlow::Continue(())
                    }
                    Err(e) => self.on_round_failed(e.to_string()).await,
                }
            }
            ServerMessage::IceCandidate { from, payload } => {
                if self.peer.as_ref().is_some_and(|peer| peer != &from) {
                    debug!(from = %from, "candidate from unexpected sender dropped");
                    return ControlFlow::Continue(());
                }
                match &self.link {
                    Some(link) if link.has_remote_description().await => {
                        if let Err(e) = link.add_remote_candidate(payload).await {
                            warn!("failed to apply remote candidate: {e}");
                        }
                    }
                    _ => self.pending_candidates.push(payload),
                }
                ControlFlow::Continue(())
            }
            ServerMessage::PeerLeft { peer_id } => {
                info!(peer = %peer_id, "peer left; back to waiting");
                self.close_link().await;
                let _ = self.remote_tx.send(Vec::new());
                self.role = None;
                self.peer = None;
                self.attempts = 0;
                self.grace_at = None;
                self.retry_at = None;
                self.pending_candidates.clear();
                if self.media.is_some() {
                    self.set_state(CallState::WaitingForPeer, None);
                }
                ControlFlow::Continue(())
            }
            ServerMessage::RoomError { message } => {
                warn!("relay refused join: {message}");
                self.teardown(
                    CallState::Failed,
                    Some(CallError::RoomFull(message).to_string()),
                )
                .await;
                ControlFlow::Break(())
            }
        }
    }

    async fn handle_link_event(&mut self, generation: u64, event: LinkEvent) -> ControlFlow<()> {
        let current = self.link.as_ref().map(PeerLink::generation);
        if current != Some(generation) {
            debug!(generation, "event from replaced connection ignored");
            return ControlFlow::Continue(());
        }

        match event {
            LinkEvent::LocalCandidate(candidate) => {
                let Some(target) = self.peer.clone() else {
                    return ControlFlow::Continue(());
                };
                self.send_signal(ClientMessage::IceCandidate {
                    target,
                    payload: candidate,
                })
                .await
            }
            LinkEvent::RemoteTrack(track) => {
                self.remote_tx.send_modify(|tracks| tracks.push(track));
                if self.state() != CallState::Connected {
                    self.set_state(CallState::Connected, None);
                    self.attempts = 0;
                }
                ControlFlow::Continue(())
            }
            LinkEvent::IceState(state) => self.handle_ice_state(state).await,
        }
    }

    async fn handle_ice_state(&mut self, state: RTCIceConnectionState) -> ControlFlow<()> {
        match state {
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                self.grace_at = None;
                let has_remote = !self.remote_tx.borrow().is_empty();
                if has_remote && self.state() != CallState::Connected {
                    self.set_state(CallState::Connected, None);
                }
                ControlFlow::Continue(())
            }
            RTCIceConnectionState::Disconnected => {
                if matches!(self.state(), CallState::Connected | CallState::Degraded) {
                    self.set_state(CallState::Degraded, None);
                    if self.grace_at.is_none() {
                        self.grace_at = Some(Instant::now() + self.config.disconnect_grace);
                    }
                }
                ControlFlow::Continue(())
            }
            RTCIceConnectionState::Failed => {
                self.on_round_failed("ice connection failed".to_owned())
                    .await
            }
            _ => ControlFlow::Continue(()),
        }
    }

    /// Grace window elapsed while still degraded: one in-place ICE restart.
    /// Only the initiator offers, so two expiring timers cannot collide.
    async fn on_grace_expired(&mut self) -> ControlFlow<()> {
        if self.state() != CallState::Degraded {
            return ControlFlow::Continue(());
        }
        if self.role != Some(CallRole::Initiator) {
            debug!("degradation persists; waiting for the initiator's restart");
            return ControlFlow::Continue(());
        }
        let (Some(link), Some(target)) = (&self.link, self.peer.clone()) else {
            return ControlFlow::Continue(());
        };
        info!("degradation persisted past grace window; restarting ice");
        match link.create_restart_offer().await {
            Ok(offer) => {
                self.set_state(CallState::Negotiating, None);
                self.send_signal(ClientMessage::Offer {
                    target,
                    payload: offer,
                })
                .await
            }
            Err(e) => self.on_round_failed(e.to_string()).await,
        }
    }

    /// Initiator side of one negotiation round: fresh connection object,
    /// local tracks, offer out.
    async fn begin_round(&mut self) -> ControlFlow<()> {
        if self.role != Some(CallRole::Initiator) {
            return ControlFlow::Continue(());
        }
        let Some(target) = self.peer.clone() else {
            return ControlFlow::Continue(());
        };
        if !self.ensure_media().await {
            return ControlFlow::Continue(());
        }
        match self.open_link().await {
            Ok(()) => {}
            Err(e) => return self.on_round_failed(e.to_string()).await,
        }
        let link = self.link.as_ref().unwrap_or_else(|| unreachable!());
        match link.create_offer().await {
            Ok(offer) => {
                self.set_state(CallState::Negotiating, None);
                self.send_signal(ClientMessage::Offer {
                    target,
                    payload: offer,
                })
                .await
            }
            Err(e) => self.on_round_failed(e.to_string()).await,
        }
    }

    /// Replace any previous connection object with a fresh one. Closing first
    /// guarantees a single negotiation round in flight per session. The
    /// candidate buffer is not touched: it may already hold candidates for
    /// the round being opened.
    async fn open_link(&mut self) -> Result<(), CallError> {
        self.close_link().await;
        let _ = self.remote_tx.send(Vec::new());

        let generation = self.next_generation;
        self.next_generation += 1;
        let link = PeerLink::new(&self.config.ice_servers, generation, self.link_tx.clone()).await?;
        if let Some(media) = &self.media {
            link.add_tracks(media).await?;
        }
        self.link = Some(link);
        Ok(())
    }

    async fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                debug!("closing previous connection failed: {e}");
            }
        }
    }

    /// Have local media, or get it now. Peer arrival is the retry trigger for
    /// an earlier MediaUnavailable.
    async fn ensure_media(&mut self) -> bool {
        if self.media.is_some() {
            return true;
        }
        self.set_state(CallState::AcquiringMedia, None);
        match self.media_source.acquire().await {
            Ok(media) => {
                self.media = Some(media.clone());
                let _ = self.local_tx.send(Some(media));
                true
            }
            Err(e) => {
                warn!("media acquisition retry failed: {e}");
                self.set_state(CallState::MediaUnavailable, Some(e.to_string()));
                false
            }
        }
    }

    /// Returns how many buffered candidates were actually applied.
    async fn flush_pending_candidates(&mut self) -> usize {
        let Some(link) = &self.link else {
            return 0;
        };
        let mut applied = 0;
        for candidate in self.pending_candidates.drain(..) {
            match link.add_remote_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("failed to apply buffered candidate: {e}"),
            }
        }
        applied
    }

    /// Hard negotiation failure. The initiator schedules a bounded, backed-off
    /// fresh round; the responder discards its half and waits for the
    /// initiator's next offer.
    async fn on_round_failed(&mut self, reason: String) -> ControlFlow<()> {
        warn!(reason, attempts = self.attempts, "negotiation round failed");
        self.close_link().await;
        let _ = self.remote_tx.send(Vec::new());
        self.grace_at = None;
        self.pending_candidates.clear();

        if self.role != Some(CallRole::Initiator) {
            self.set_state(CallState::Negotiating, None);
            return ControlFlow::Continue(());
        }

        if self.attempts >= self.config.max_negotiation_attempts {
            self.teardown(
                CallState::Failed,
                Some(
                    CallError::NegotiationFailed {
                        attempts: self.attempts,
                    }
                    .to_string(),
                ),
            )
            .await;
            return ControlFlow::Break(());
        }

        self.attempts += 1;
        let backoff = self.config.retry_backoff * self.attempts;
        info!(attempt = self.attempts, ?backoff, "scheduling renegotiation");
        self.set_state(CallState::Negotiating, Some(reason));
        self.retry_at = Some(Instant::now() + backoff);
        ControlFlow::Continue(())
    }

    async fn send_signal(&mut self, message: ClientMessage) -> ControlFlow<()> {
        if self.signaling.send(message).await.is_err() {
            self.teardown(
                CallState::Closed,
                Some(CallError::from(SignalingError::Closed).to_string()),
            )
            .await;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// The one disposal path. Stops every local track, closes the connection
    /// object, tells the relay, clears exposed streams. Idempotent: a second
    /// invocation (unmount racing an error path) does nothing.
    async fn teardown(&mut self, final_state: CallState, last_error: Option<String>) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(media) = &self.media {
            media.stop();
        }
        self.close_link().await;
        let _ = self.remote_tx.send(Vec::new());
        self.grace_at = None;
        self.retry_at = None;
        let _ = self
            .signaling
            .send(ClientMessage::LeaveRoom {
                session_key: self.session_key.clone(),
            })
            .await;
        self.set_state(final_state, last_error);
        info!(session = %self.session_key, "call torn down");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
