use crate::backend::MediaConstraints;
use crate::engine::{CallCommand, CallManager};
use crate::web::backend::WebBackend;
use crate::web::logger::{Logger, describe};
use classmeet_core::{ClientMessage, RoomId, ServerMessage};
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{MessageEvent, WebSocket};

/// Page-facing handle of one meeting.
///
/// `on_event` receives every call event as a plain JS object with a `type`
/// field. Frames queued before the socket opens are sent once it does.
#[wasm_bindgen]
pub struct MeetingClient {
    commands: mpsc::UnboundedSender<CallCommand>,
    ws: WebSocket,
    _on_open: Closure<dyn FnMut(JsValue)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(JsValue)>,
}

#[wasm_bindgen]
impl MeetingClient {
    #[wasm_bindgen(constructor)]
    pub fn new(
        url: &str,
        container_id: &str,
        on_event: js_sys::Function,
    ) -> Result<MeetingClient, JsValue> {
        let backend = WebBackend::new(container_id).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let ws = WebSocket::new(url)?;

        let (out_tx, mut out_rx) = mpsc::unbounded::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded::<ServerMessage>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded::<CallCommand>();
        let (open_tx, open_rx) = oneshot::channel::<()>();

        let on_open = {
            let mut open_tx = Some(open_tx);
            Closure::<dyn FnMut(JsValue)>::new(move |_| {
                Logger::info("signaling connected");
                if let Some(tx) = open_tx.take() {
                    let _ = tx.send(());
                }
            })
        };
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let on_message = {
            let in_tx = in_tx.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |e: MessageEvent| {
                let Some(text) = e.data().as_string() else {
                    return;
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => {
                        let _ = in_tx.unbounded_send(msg);
                    }
                    Err(e) => Logger::warn(&format!("Signal parse error: {}", e)),
                }
            })
        };
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        let on_close = Closure::<dyn FnMut(JsValue)>::new(move |_| {
            Logger::warn("signaling connection closed");
            in_tx.close_channel();
        });
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        {
            let ws = ws.clone();
            spawn_local(async move {
                if open_rx.await.is_err() {
                    return;
                }
                while let Some(msg) = out_rx.next().await {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            Logger::warn(&format!("failed to encode frame: {}", e));
                            continue;
                        }
                    };
                    if let Err(e) = ws.send_with_str(&json) {
                        Logger::error("signaling send failed", &e);
                        break;
                    }
                }
            });
        }

        let mut manager = CallManager::new(backend, out_tx);
        let mut events = manager.subscribe();

        spawn_local(async move {
            while let Some(event) = events.next().await {
                match serde_wasm_bindgen::to_value(&event) {
                    Ok(value) => {
                        if let Err(e) = on_event.call1(&JsValue::NULL, &value) {
                            Logger::error("event handler threw", &e);
                        }
                    }
                    Err(e) => Logger::warn(&format!("failed to convert event: {}", e)),
                }
            }
        });

        spawn_local(async move {
            if let Err(e) = manager.run(in_rx, cmd_rx).await {
                Logger::warn(&e.to_string());
            }
        });

        Ok(MeetingClient {
            commands: cmd_tx,
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
        })
    }

    /// Requests camera and microphone.
    pub fn start(&self, audio: bool, video: bool) {
        self.command(CallCommand::Start(MediaConstraints { audio, video }));
    }

    /// Fails right away on a malformed room code.
    pub fn join(&self, room: &str, token: Option<String>) -> Result<(), JsValue> {
        let room = RoomId::parse(room).map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.command(CallCommand::Join {
            room: room.into(),
            token,
            meta: None,
        });
        Ok(())
    }

    #[wasm_bindgen(js_name = sendChat)]
    pub fn send_chat(&self, text: &str) {
        self.command(CallCommand::SendChat(text.to_string()));
    }

    #[wasm_bindgen(js_name = setAudioEnabled)]
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.command(CallCommand::SetAudioEnabled(enabled));
    }

    #[wasm_bindgen(js_name = setVideoEnabled)]
    pub fn set_video_enabled(&self, enabled: bool) {
        self.command(CallCommand::SetVideoEnabled(enabled));
    }

    #[wasm_bindgen(js_name = endCall)]
    pub fn end_call(&self) {
        self.command(CallCommand::EndCall);
    }

    fn command(&self, cmd: CallCommand) {
        if self.commands.unbounded_send(cmd).is_err() {
            Logger::warn("call already finished");
        }
    }
}

impl Drop for MeetingClient {
    fn drop(&mut self) {
        self.command(CallCommand::EndCall);
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onclose(None);
        if let Err(e) = self.ws.close() {
            Logger::warn(&describe(&e));
        }
    }
}
