//! Scripted transports for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::transport::{Transport, TransportError};

#[derive(Clone)]
pub(crate) enum Reply {
    Text(String),
    /// Connection reset mid-request.
    Drop,
    /// Never answers; the caller's timeout has to fire.
    Hang,
}

impl Reply {
    pub(crate) fn text(body: &str) -> Self {
        Reply::Text(body.to_string())
    }
}

type Handler = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

pub(crate) struct ScriptedTransport {
    script: VecDeque<Reply>,
    fallback: Option<Handler>,
    reject_auth: bool,
    open_calls: u64,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Reply>) -> Self {
        Self {
            script: script.into(),
            fallback: None,
            reject_auth: false,
            open_calls: 0,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn repeating(reply: Reply) -> Self {
        Self::with_handler(move |_| reply.clone())
    }

    pub(crate) fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let mut transport = Self::new(Vec::new());
        transport.fallback = Some(Arc::new(handler));
        transport
    }

    pub(crate) fn rejecting_auth() -> Self {
        let mut transport = Self::repeating(Reply::text(""));
        transport.reject_auth = true;
        transport
    }

    pub(crate) fn open_calls(&self) -> u64 {
        self.open_calls
    }

    /// Shared view of every command received, in order.
    pub(crate) fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.open_calls += 1;
        if self.reject_auth {
            return Err(TransportError::AuthRejected("scripted".to_string()));
        }
        Ok(())
    }

    async fn request(&mut self, command: &str) -> Result<String, TransportError> {
        self.sent
            .lock()
            .expect("sent log mutex poisoned")
            .push(command.to_string());
        let reply = match self.script.pop_front() {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(handler) => handler(command),
                None => panic!("script exhausted at command {command:?}"),
            },
        };
        match reply {
            Reply::Text(body) => Ok(body),
            Reply::Drop => Err(TransportError::Closed),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn close(&mut self) {}
}
