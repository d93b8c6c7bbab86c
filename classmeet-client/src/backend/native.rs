use crate::backend::{LocalMedia, MediaConstraints, PeerEvent, PeerEventSender, PeerLink, RtcBackend, SdpKind};
use crate::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use classmeet_core::{ConnectionId, IceCandidate, IceServerConfig};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

type RemoteTracks = Arc<Mutex<HashMap<ConnectionId, Vec<Arc<TrackRemote>>>>>;

fn backend_err(e: webrtc::Error) -> ClientError {
    ClientError::Backend(e.to_string())
}

/// States after which the link carries no more media.
fn is_lost(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
    )
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// WebRTC stack for native builds.
///
/// There is no capture device here: the embedding application feeds encoded
/// Opus and VP8 frames into [`NativeMedia`], and reads remote media from
/// [`NativeBackend::remote_tracks`] once a peer is bound.
pub struct NativeBackend {
    api: API,
    stream_id: String,
    remote: RemoteTracks,
    bound: Mutex<HashSet<ConnectionId>>,
}

impl NativeBackend {
    pub fn new() -> Result<Self, ClientError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(backend_err)?;

        let registry =
            register_default_interceptors(Registry::new(), &mut media_engine).map_err(backend_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            stream_id: format!("classmeet-{}", ConnectionId::new()),
            remote: Arc::new(Mutex::new(HashMap::new())),
            bound: Mutex::new(HashSet::new()),
        })
    }

    /// Remote tracks of a bound peer.
    pub fn remote_tracks(&self, peer: &ConnectionId) -> Vec<Arc<TrackRemote>> {
        if !lock(&self.bound).contains(peer) {
            return Vec::new();
        }
        lock(&self.remote).get(peer).cloned().unwrap_or_default()
    }

    pub fn is_bound(&self, peer: &ConnectionId) -> bool {
        lock(&self.bound).contains(peer)
    }
}

#[async_trait]
impl RtcBackend for NativeBackend {
    type Media = NativeMedia;
    type Peer = NativePeer;

    async fn capture(&self, constraints: MediaConstraints) -> Result<NativeMedia, ClientError> {
        if !constraints.audio && !constraints.video {
            return Err(ClientError::MediaAccessDenied(
                "neither audio nor video requested".into(),
            ));
        }

        let audio = constraints.audio.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                self.stream_id.clone(),
            ))
        });
        let video = constraints.video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                self.stream_id.clone(),
            ))
        });

        info!(audio = constraints.audio, video = constraints.video, "local media ready");

        Ok(NativeMedia {
            audio,
            video,
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    async fn create_peer(
        &self,
        peer: ConnectionId,
        ice_servers: &[IceServerConfig],
        media: &NativeMedia,
        events: PeerEventSender,
    ) -> Result<NativePeer, ClientError> {
        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(backend_err)?,
        );

        for track in media.tracks() {
            pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(backend_err)?;
        }

        let ice_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let ice_tx = ice_tx.clone();
            Box::pin(async move {
                let Some(c) = c else {
                    return;
                };
                match c.to_json() {
                    Ok(init) => {
                        let _ = ice_tx.unbounded_send(PeerEvent::LocalCandidate {
                            peer,
                            candidate: IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_m_line_index: init.sdp_mline_index,
                            },
                        });
                    }
                    Err(e) => warn!(%peer, "failed to encode local candidate: {}", e),
                }
            })
        }));

        let track_tx = events.clone();
        let remote = Arc::clone(&self.remote);
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            debug!(%peer, kind = %track.kind(), "remote track");
            lock(&remote).entry(peer).or_default().push(track);
            let _ = track_tx.unbounded_send(PeerEvent::RemoteTrack { peer });
            Box::pin(async {})
        }));

        let state_tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(%peer, ?state, "peer connection state");
            if is_lost(state) {
                let _ = state_tx.unbounded_send(PeerEvent::ConnectionLost { peer });
            }
            Box::pin(async {})
        }));

        Ok(NativePeer { peer, pc })
    }

    fn bind_remote(&self, peer: &ConnectionId) {
        lock(&self.bound).insert(*peer);
    }

    fn release_remote(&self, peer: &ConnectionId) {
        lock(&self.bound).remove(peer);
        lock(&self.remote).remove(peer);
    }
}

/// Local Opus and VP8 tracks shared by every peer link of the call.
pub struct NativeMedia {
    audio: Option<Arc<TrackLocalStaticSample>>,
    video: Option<Arc<TrackLocalStaticSample>>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    stopped: AtomicBool,
}

impl NativeMedia {
    fn tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    /// Feeds one encoded Opus frame. Dropped while muted or stopped.
    pub async fn write_audio(&self, data: Bytes, duration: Duration) -> Result<(), ClientError> {
        if !self.audio_enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        Self::write(&self.audio, &self.stopped, data, duration).await
    }

    /// Feeds one encoded VP8 frame. Dropped while the camera is off or stopped.
    pub async fn write_video(&self, data: Bytes, duration: Duration) -> Result<(), ClientError> {
        if !self.video_enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        Self::write(&self.video, &self.stopped, data, duration).await
    }

    async fn write(
        track: &Option<Arc<TrackLocalStaticSample>>,
        stopped: &AtomicBool,
        data: Bytes,
        duration: Duration,
    ) -> Result<(), ClientError> {
        let Some(track) = track else {
            return Ok(());
        };
        if stopped.load(Ordering::Relaxed) {
            return Ok(());
        }

        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(backend_err)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl LocalMedia for NativeMedia {
    fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::Relaxed);
    }

    fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::Relaxed);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            info!("local media stopped");
        }
    }
}

pub struct NativePeer {
    peer: ConnectionId,
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerLink for NativePeer {
    async fn create_offer(&self) -> Result<String, ClientError> {
        let offer = self.pc.create_offer(None).await.map_err(backend_err)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(backend_err)?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, ClientError> {
        let answer = self.pc.create_answer(None).await.map_err(backend_err)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(backend_err)?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), ClientError> {
        let desc = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp.to_owned()),
            SdpKind::Answer => RTCSessionDescription::answer(sdp.to_owned()),
        }
        .map_err(backend_err)?;

        self.pc
            .set_remote_description(desc)
            .await
            .map_err(backend_err)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await
            .map_err(backend_err)
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!(peer = %self.peer, "closing peer connection: {}", e);
        }
    }

    fn close_detached(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(peer = %self.peer, "no runtime left to close the peer connection on");
            return;
        };
        let peer = self.peer;
        let pc = Arc::clone(&self.pc);
        runtime.spawn(async move {
            if let Err(e) = pc.close().await {
                warn!(%peer, "closing peer connection: {}", e);
            }
        });
    }
}
