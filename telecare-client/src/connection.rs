use std::sync::Arc;
use telecare_core::{CandidateInit, IceServerConfig, SessionDescription};
use tokio::sync::mpsc;
use tracing::debug;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_remote::TrackRemote;

use crate::media::LocalMedia;

/// What a live connection object reports back to the orchestrator's event
/// loop. Tagged with the link generation so events from an already-replaced
/// connection are recognizable as stale.
#[derive(Debug)]
pub enum LinkEvent {
    /// Trickle ICE: a locally discovered network-path candidate to forward.
    LocalCandidate(CandidateInit),
    IceState(RTCIceConnectionState),
    RemoteTrack(Arc<TrackRemote>),
}

/// Owned wrapper around one RTCPeerConnection. Only the orchestrator ever
/// constructs or closes one.
pub struct PeerLink {
    generation: u64,
    peer_connection: Arc<RTCPeerConnection>,
}

impl PeerLink {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        generation: u64,
        event_tx: mpsc::Sender<(u64, LinkEvent)>,
    ) -> Result<Self, webrtc::Error> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let init = CandidateInit {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx.send((generation, LinkEvent::LocalCandidate(init))).await;
            })
        }));

        let state_tx = event_tx.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    debug!(?state, generation, "ice connection state changed");
                    let _ = tx.send((generation, LinkEvent::IceState(state))).await;
                })
            },
        ));

        let track_tx = event_tx.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            Box::pin(async move {
                debug!(kind = %track.kind(), generation, "remote track arrived");
                let _ = tx.send((generation, LinkEvent::RemoteTrack(track))).await;
            })
        }));

        Ok(Self {
            generation,
            peer_connection,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn add_tracks(&self, media: &LocalMedia) -> Result<(), webrtc::Error> {
        for track in media.tracks() {
            self.peer_connection.add_track(track).await?;
        }
        Ok(())
    }

    /// Create and install a local offer.
    pub async fn create_offer(&self) -> Result<SessionDescription, webrtc::Error> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription { sdp: offer.sdp })
    }

    /// Offer with `ice_restart`: renegotiates candidates only, keeping the
    /// logical call.
    pub async fn create_restart_offer(&self) -> Result<SessionDescription, webrtc::Error> {
        let options = RTCOfferOptions {
            ice_restart: true,
            voice_activity_detection: false,
        };
        let offer = self.peer_connection.create_offer(Some(options)).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription { sdp: offer.sdp })
    }

    /// Apply the remote offer and answer it.
    pub async fn apply_remote_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, webrtc::Error> {
        let desc = RTCSessionDescription::offer(offer.sdp)?;
        self.peer_connection.set_remote_description(desc).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(SessionDescription { sdp: answer.sdp })
    }

    pub async fn apply_remote_answer(
        &self,
        answer: SessionDescription,
    ) -> Result<(), webrtc::Error> {
        let desc = RTCSessionDescription::answer(answer.sdp)?;
        self.peer_connection.set_remote_description(desc).await
    }

    pub async fn add_remote_candidate(&self, init: CandidateInit) -> Result<(), webrtc::Error> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: init.candidate,
                sdp_mid: init.sdp_mid,
                sdp_mline_index: init.sdp_m_line_index,
                username_fragment: None,
            })
            .await
    }

    pub async fn has_remote_description(&self) -> bool {
        self.peer_connection.remote_description().await.is_some()
    }

    pub async fn close(&self) -> Result<(), webrtc::Error> {
        self.peer_connection.close().await
    }
}
