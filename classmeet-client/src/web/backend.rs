use crate::backend::{
    LocalMedia, MediaConstraints, PeerEvent, PeerEventSender, PeerLink, RtcBackend, SdpKind,
};
use crate::error::ClientError;
use crate::web::logger::{Logger, describe};
use async_trait::async_trait;
use classmeet_core::{ConnectionId, IceCandidate, IceServerConfig};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Element, HtmlVideoElement, MediaStream, MediaStreamConstraints, MediaStreamTrack,
    RtcConfiguration, RtcIceCandidateInit, RtcIceServer, RtcPeerConnection,
    RtcPeerConnectionIceEvent, RtcPeerConnectionState, RtcSdpType, RtcSessionDescriptionInit,
    RtcTrackEvent,
};

fn js_err(err: JsValue) -> ClientError {
    ClientError::Backend(describe(&err))
}

fn document() -> Result<web_sys::Document, ClientError> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| ClientError::Backend("no document".into()))
}

fn video_surface(stream: &MediaStream, id: &str, muted: bool) -> Result<HtmlVideoElement, ClientError> {
    let video: HtmlVideoElement = document()?
        .create_element("video")
        .map_err(js_err)?
        .dyn_into()
        .map_err(|_| ClientError::Backend("video element expected".into()))?;

    video.set_id(id);
    video.set_autoplay(true);
    video.set_muted(muted);
    video.set_attribute("playsinline", "").map_err(js_err)?;
    video.set_src_object(Some(stream));
    Ok(video)
}

fn tracks(list: js_sys::Array) -> impl Iterator<Item = MediaStreamTrack> {
    list.iter().map(|t| t.unchecked_into::<MediaStreamTrack>())
}

/// Browser WebRTC: `getUserMedia`, one `RTCPeerConnection` per peer and a
/// `<video>` surface per bound remote inside the given container.
pub struct WebBackend {
    container: Element,
    remote_streams: Rc<RefCell<HashMap<ConnectionId, MediaStream>>>,
    surfaces: RefCell<HashMap<ConnectionId, HtmlVideoElement>>,
}

impl WebBackend {
    pub fn new(container_id: &str) -> Result<Self, ClientError> {
        let container = document()?
            .get_element_by_id(container_id)
            .ok_or_else(|| ClientError::Backend(format!("no element #{}", container_id)))?;

        Ok(Self {
            container,
            remote_streams: Rc::new(RefCell::new(HashMap::new())),
            surfaces: RefCell::new(HashMap::new()),
        })
    }
}

#[async_trait(?Send)]
impl RtcBackend for WebBackend {
    type Media = WebMedia;
    type Peer = WebPeer;

    async fn capture(&self, constraints: MediaConstraints) -> Result<WebMedia, ClientError> {
        let devices = web_sys::window()
            .ok_or_else(|| ClientError::MediaAccessDenied("no window".into()))?
            .navigator()
            .media_devices()
            .map_err(|e| ClientError::MediaAccessDenied(describe(&e)))?;

        let request = MediaStreamConstraints::new();
        request.set_audio(&JsValue::from_bool(constraints.audio));
        request.set_video(&JsValue::from_bool(constraints.video));

        let promise = devices
            .get_user_media_with_constraints(&request)
            .map_err(|e| ClientError::MediaAccessDenied(describe(&e)))?;
        let stream: MediaStream = JsFuture::from(promise)
            .await
            .map_err(|e| ClientError::MediaAccessDenied(describe(&e)))?
            .dyn_into()
            .map_err(|_| ClientError::MediaAccessDenied("not a media stream".into()))?;

        let preview = video_surface(&stream, "local-video", true)?;
        self.container.append_child(&preview).map_err(js_err)?;
        Logger::info("camera and microphone opened");

        Ok(WebMedia {
            stream,
            preview,
            stopped: RefCell::new(false),
        })
    }

    async fn create_peer(
        &self,
        peer: ConnectionId,
        ice_servers: &[IceServerConfig],
        media: &WebMedia,
        events: PeerEventSender,
    ) -> Result<WebPeer, ClientError> {
        let rtc_config = RtcConfiguration::new();
        let servers = js_sys::Array::new();
        for server in ice_servers {
            let entry = RtcIceServer::new();
            let urls = js_sys::Array::new();
            for url in &server.urls {
                urls.push(&JsValue::from_str(url));
            }
            entry.set_urls(&urls);
            if let Some(username) = &server.username {
                entry.set_username(username);
            }
            if let Some(credential) = &server.credential {
                entry.set_credential(credential);
            }
            servers.push(&entry);
        }
        rtc_config.set_ice_servers(&servers);

        let pc = RtcPeerConnection::new_with_configuration(&rtc_config).map_err(js_err)?;

        for track in tracks(media.stream.get_tracks()) {
            pc.add_track_0(&track, &media.stream);
        }

        let on_ice = {
            let events = events.clone();
            Closure::<dyn FnMut(RtcPeerConnectionIceEvent)>::new(
                move |ev: RtcPeerConnectionIceEvent| {
                    if let Some(c) = ev.candidate() {
                        let candidate = IceCandidate {
                            candidate: c.candidate(),
                            sdp_mid: c.sdp_mid(),
                            sdp_m_line_index: c.sdp_m_line_index(),
                        };
                        let _ = events.unbounded_send(PeerEvent::LocalCandidate { peer, candidate });
                    }
                },
            )
        };
        pc.set_onicecandidate(Some(on_ice.as_ref().unchecked_ref()));

        let on_track = {
            let events = events.clone();
            let remote_streams = self.remote_streams.clone();
            Closure::<dyn FnMut(RtcTrackEvent)>::new(move |ev: RtcTrackEvent| {
                if let Ok(stream) = ev.streams().get(0).dyn_into::<MediaStream>() {
                    remote_streams.borrow_mut().insert(peer, stream);
                    let _ = events.unbounded_send(PeerEvent::RemoteTrack { peer });
                }
            })
        };
        pc.set_ontrack(Some(on_track.as_ref().unchecked_ref()));

        let on_state = {
            let pc = pc.clone();
            Closure::<dyn FnMut(JsValue)>::new(move |_| {
                if matches!(
                    pc.connection_state(),
                    RtcPeerConnectionState::Failed | RtcPeerConnectionState::Closed
                ) {
                    let _ = events.unbounded_send(PeerEvent::ConnectionLost { peer });
                }
            })
        };
        pc.set_onconnectionstatechange(Some(on_state.as_ref().unchecked_ref()));

        Ok(WebPeer {
            pc,
            _on_ice: on_ice,
            _on_track: on_track,
            _on_state: on_state,
        })
    }

    fn bind_remote(&self, peer: &ConnectionId) {
        let Some(stream) = self.remote_streams.borrow().get(peer).cloned() else {
            return;
        };

        match video_surface(&stream, &format!("remote-{}", peer), false) {
            Ok(video) => {
                if let Err(e) = self.container.append_child(&video) {
                    Logger::error("failed to attach remote video", &e);
                    return;
                }
                self.surfaces.borrow_mut().insert(*peer, video);
            }
            Err(e) => Logger::warn(&e.to_string()),
        }
    }

    fn release_remote(&self, peer: &ConnectionId) {
        if let Some(video) = self.surfaces.borrow_mut().remove(peer) {
            video.set_src_object(None);
            video.remove();
        }
        self.remote_streams.borrow_mut().remove(peer);
    }
}

pub struct WebMedia {
    stream: MediaStream,
    preview: HtmlVideoElement,
    stopped: RefCell<bool>,
}

impl LocalMedia for WebMedia {
    fn set_audio_enabled(&self, enabled: bool) {
        for track in tracks(self.stream.get_audio_tracks()) {
            track.set_enabled(enabled);
        }
    }

    fn set_video_enabled(&self, enabled: bool) {
        for track in tracks(self.stream.get_video_tracks()) {
            track.set_enabled(enabled);
        }
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        for track in tracks(self.stream.get_tracks()) {
            track.stop();
        }
        self.preview.set_src_object(None);
        self.preview.remove();
        Logger::info("camera and microphone released");
    }
}

pub struct WebPeer {
    pc: RtcPeerConnection,
    _on_ice: Closure<dyn FnMut(RtcPeerConnectionIceEvent)>,
    _on_track: Closure<dyn FnMut(RtcTrackEvent)>,
    _on_state: Closure<dyn FnMut(JsValue)>,
}

impl WebPeer {
    async fn local_description(&self, sdp_type: RtcSdpType, created: JsValue) -> Result<String, ClientError> {
        let sdp = js_sys::Reflect::get(&created, &JsValue::from_str("sdp"))
            .map_err(js_err)?
            .as_string()
            .ok_or_else(|| ClientError::Backend("session description without sdp".into()))?;

        let init = RtcSessionDescriptionInit::new(sdp_type);
        init.set_sdp(&sdp);
        JsFuture::from(self.pc.set_local_description(&init))
            .await
            .map_err(js_err)?;
        Ok(sdp)
    }
}

#[async_trait(?Send)]
impl PeerLink for WebPeer {
    async fn create_offer(&self) -> Result<String, ClientError> {
        let offer = JsFuture::from(self.pc.create_offer()).await.map_err(js_err)?;
        self.local_description(RtcSdpType::Offer, offer).await
    }

    async fn create_answer(&self) -> Result<String, ClientError> {
        let answer = JsFuture::from(self.pc.create_answer()).await.map_err(js_err)?;
        self.local_description(RtcSdpType::Answer, answer).await
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), ClientError> {
        let sdp_type = match kind {
            SdpKind::Offer => RtcSdpType::Offer,
            SdpKind::Answer => RtcSdpType::Answer,
        };
        let init = RtcSessionDescriptionInit::new(sdp_type);
        init.set_sdp(sdp);
        JsFuture::from(self.pc.set_remote_description(&init))
            .await
            .map_err(js_err)?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError> {
        let init = RtcIceCandidateInit::new(&candidate.candidate);
        init.set_sdp_mid(candidate.sdp_mid.as_deref());
        init.set_sdp_m_line_index(candidate.sdp_m_line_index);
        JsFuture::from(
            self.pc
                .add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(&init)),
        )
        .await
        .map_err(js_err)?;
        Ok(())
    }

    async fn close(&self) {
        self.close_detached();
    }

    fn close_detached(&self) {
        self.pc.set_onicecandidate(None);
        self.pc.set_ontrack(None);
        self.pc.set_onconnectionstatechange(None);
        self.pc.close();
    }
}
