use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use chatter_types::models::Session;

/// Which prebuilt call template to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Voice,
    Video,
}

/// Long-lived application credentials for the call SDK.
#[derive(Debug, Clone)]
pub struct CallCredentials {
    pub app_id: i64,
    pub app_sign: String,
}

/// Everything the vendor SDK needs to bring up a call room.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInvocation {
    pub app_id: i64,
    pub app_sign: String,
    pub user_id: String,
    pub user_name: String,
    /// Room id; the channel doubles as the room.
    pub call_id: String,
    pub kind: CallKind,
}

/// Seam for the vendor call SDK. The application owns no call state:
/// once launched, the room lives and dies inside the SDK, and the
/// launcher is not told when a call ends.
pub trait CallBackend: Send + Sync {
    fn launch(&self, invocation: CallInvocation) -> Result<()>;
}

pub struct CallLauncher {
    credentials: CallCredentials,
    backend: Arc<dyn CallBackend>,
}

impl CallLauncher {
    pub fn new(credentials: CallCredentials, backend: Arc<dyn CallBackend>) -> Self {
        Self {
            credentials,
            backend,
        }
    }

    pub fn start_call(&self, channel_id: &str, session: &Session, kind: CallKind) -> Result<()> {
        let invocation = CallInvocation {
            app_id: self.credentials.app_id,
            app_sign: self.credentials.app_sign.clone(),
            user_id: session.user_id.clone(),
            user_name: session.display_name.clone(),
            call_id: channel_id.to_string(),
            kind,
        };

        info!("starting {kind:?} call in room {channel_id}");
        self.backend.launch(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<CallInvocation>>);

    impl CallBackend for Recorder {
        fn launch(&self, invocation: CallInvocation) -> Result<()> {
            self.0.lock().unwrap().push(invocation);
            Ok(())
        }
    }

    fn session() -> Session {
        Session {
            user_id: "u1".into(),
            display_name: "Ada".into(),
            email: "ada@example.com".into(),
            id_token: "tok".into(),
        }
    }

    #[test]
    fn channel_becomes_the_room_and_credentials_pass_through() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let launcher = CallLauncher::new(
            CallCredentials {
                app_id: 566529291,
                app_sign: "sign".into(),
            },
            recorder.clone(),
        );

        launcher.start_call("c1", &session(), CallKind::Video).unwrap();

        let calls = recorder.0.lock().unwrap();
        assert_eq!(
            *calls,
            vec![CallInvocation {
                app_id: 566529291,
                app_sign: "sign".into(),
                user_id: "u1".into(),
                user_name: "Ada".into(),
                call_id: "c1".into(),
                kind: CallKind::Video,
            }]
        );
    }

    #[test]
    fn voice_selects_the_voice_template() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let launcher = CallLauncher::new(
            CallCredentials {
                app_id: 1,
                app_sign: "sign".into(),
            },
            recorder.clone(),
        );

        launcher.start_call("c1", &session(), CallKind::Voice).unwrap();
        assert_eq!(recorder.0.lock().unwrap()[0].kind, CallKind::Voice);
    }
}
