//! The detector controller.
//!
//! A [`Detector`] pushes the initial configuration to the control server,
//! polls it for its configuration every poll period, folds each reply into
//! the local [`DetectorState`] through the parameter tree, and dispatches
//! commands. All of it happens on whichever task drives [`Detector::run`].

use std::time::Duration;

use serde_json::Value;
use strum::{AsRefStr, Display};
use tracing::{debug, info, trace, warn};

use crate::config::{Backpressure, DetectorConfig};
use crate::handle::{DetectorHandle, DetectorRequest};
use crate::message::{self, Message, MessageKind, MsgType, Params, Verb};
use crate::param::layout::{CONFIG_PATHS, device_group, insert_nested};
use crate::param::{ParameterTree, SetOutcome, detector_tree};
use crate::pending::PendingRequests;
use crate::reactor::{Event, Reactor};
use crate::state::{DetectorSettings, DetectorState};
use crate::transport::{Link, TransportClient, ZLink};
use crate::{Builder, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ControllerState {
    Disconnected,
    Configuring,
    Connected,
    Polling,
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub poll_interval: Duration,
    pub pending_timeout: Duration,
    pub max_pending: usize,
    pub backpressure: Backpressure,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

impl From<&DetectorConfig> for DetectorOptions {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            pending_timeout: config.pending_timeout(),
            max_pending: config.max_pending,
            backpressure: config.backpressure,
        }
    }
}

/// Connects a [`Detector`] from a [`DetectorConfig`].
pub struct DetectorBuilder<L: Link = ZLink> {
    config: DetectorConfig,
    link: L::Config,
}

impl DetectorBuilder<ZLink> {
    pub fn new(config: DetectorConfig) -> Self {
        let link = config.link_config();
        Self { config, link }
    }
}

impl<L: Link> DetectorBuilder<L> {
    /// Use a specific link configuration, e.g. a mock link in tests.
    pub fn with_link_config(config: DetectorConfig, link: L::Config) -> Self {
        Self { config, link }
    }
}

impl<L: Link> Builder for DetectorBuilder<L> {
    type Output = Detector<L>;

    fn build(self) -> Result<Detector<L>> {
        self.config.validate()?;
        let client = TransportClient::connect(self.config.endpoint()?, &self.link)?;
        Detector::new(client, Reactor::new(), DetectorOptions::from(&self.config))
    }
}

pub struct Detector<L: Link> {
    client: TransportClient<L>,
    reactor: Reactor,
    tree: ParameterTree<DetectorState>,
    state: DetectorState,
    pending: PendingRequests,
    phase: ControllerState,
    poll_interval: Duration,
    initial_config: Option<Params>,
}

impl<L: Link> Detector<L> {
    pub fn new(client: TransportClient<L>, reactor: Reactor, options: DetectorOptions) -> Result<Self> {
        client.on_receive(reactor.frame_handler());
        let state = DetectorState {
            ctrl_endpoint: format!("{}:{}", client.endpoint().address, client.endpoint().port),
            ..Default::default()
        };
        Ok(Self {
            client,
            reactor,
            tree: detector_tree()?,
            state,
            pending: PendingRequests::new(
                options.max_pending,
                options.pending_timeout,
                options.backpressure,
            ),
            phase: ControllerState::Disconnected,
            poll_interval: options.poll_interval,
            initial_config: None,
        })
    }

    pub fn handle(&self) -> DetectorHandle {
        self.reactor.handle()
    }

    pub fn client(&self) -> &TransportClient<L> {
        &self.client
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn controller_state(&self) -> ControllerState {
        self.phase
    }

    pub fn tree(&self) -> &ParameterTree<DetectorState> {
        &self.tree
    }

    pub fn queue_depth(&self) -> usize {
        self.client.queue_depth()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn is_polling(&self) -> bool {
        self.reactor.is_polling()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.phase == ControllerState::ShuttingDown {
            return Err(Error::connection("detector controller is shutting down"));
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        self.ensure_running()?;
        if !self.client.is_connected() {
            return Err(Error::connection(format!(
                "not connected to {}",
                self.client.endpoint()
            )));
        }
        Ok(())
    }

    /// Encode, send and record one message. Returns its id.
    fn dispatch(&mut self, msg: Message) -> Result<u32> {
        self.ensure_running()?;
        self.pending.reserve(msg.verb)?;
        let id = self.client.next_id();
        let msg = msg.with_id(id);
        let frame = message::encode(&msg)?;
        self.client.send(frame)?;
        self.pending.insert(id, msg.verb);
        debug!("[CTL] -> {} '{}' id={}", msg.kind(), msg.verb, id);
        Ok(id)
    }

    /// The configure payload for the current state: `{xsp: {...}, daq: {...}}`.
    fn config_params(&self) -> Result<Params> {
        let mut params = Params::new();
        for path in CONFIG_PATHS {
            insert_nested(&mut params, path, self.tree.get(&self.state, path)?);
        }
        Ok(params)
    }

    /// Push the initial configuration, request the device's view of it, and
    /// start polling.
    #[tracing::instrument(name = "detector_configure", skip_all, fields(endpoint = %self.client.endpoint()))]
    pub fn configure(&mut self, settings: &DetectorSettings) -> Result<()> {
        let fail = |e: Error| match e {
            Error::Configuration(_) => e,
            e => Error::configuration(format!("initial configuration failed: {e}")),
        };

        self.ensure_running().map_err(fail)?;
        if !self.client.is_connected() {
            warn!("[CTL] no control server seen yet at {}", self.client.endpoint());
        }
        self.phase = ControllerState::Configuring;
        self.state.apply_settings(settings);

        let params = self.config_params().map_err(fail)?;
        self.dispatch(Message::config(params.clone())).map_err(fail)?;
        self.initial_config = Some(params);
        self.phase = ControllerState::Connected;

        self.request_configuration().map_err(fail)?;
        self.reactor.schedule_poll(self.poll_interval);
        self.phase = ControllerState::Polling;
        info!(
            "[CTL] configured {} cards, polling every {:?}",
            settings.num_cards, self.poll_interval
        );
        Ok(())
    }

    /// Send one configuration request. Used by the poll timer.
    pub fn request_configuration(&mut self) -> Result<u32> {
        self.dispatch(Message::request())
    }

    /// Send a bare command. Its outcome shows up in the next poll.
    pub fn command(&mut self, verb: Verb) -> Result<()> {
        if verb.kind() != MessageKind::Cmd {
            return Err(Error::protocol(format!("'{verb}' is not a command")));
        }
        self.ensure_connected()?;
        self.dispatch(Message::command(verb))?;
        Ok(())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.command(Verb::Connect)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.command(Verb::Disconnect)
    }

    pub fn save(&mut self) -> Result<()> {
        self.command(Verb::Save)
    }

    pub fn restore(&mut self) -> Result<()> {
        self.command(Verb::Restore)
    }

    pub fn start(&mut self) -> Result<()> {
        self.command(Verb::Start)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.command(Verb::Stop)
    }

    pub fn trigger(&mut self) -> Result<()> {
        self.command(Verb::Trigger)
    }

    /// Re-send the configuration pushed by [`configure`](Self::configure).
    pub fn reset(&mut self) -> Result<()> {
        let Some(params) = self.initial_config.clone() else {
            return Err(Error::configuration("detector has not been configured"));
        };
        self.ensure_connected()?;
        self.dispatch(Message::config(params))?;
        Ok(())
    }

    pub fn pause_polling(&mut self) {
        self.reactor.cancel_poll();
        if self.phase == ControllerState::Polling {
            self.phase = ControllerState::Connected;
        }
    }

    pub fn resume_polling(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.initial_config.is_none() {
            return Err(Error::configuration("detector has not been configured"));
        }
        if !self.reactor.is_polling() {
            self.reactor.schedule_poll(self.poll_interval);
        }
        self.phase = ControllerState::Polling;
        Ok(())
    }

    /// Stop polling, refuse further requests and close the link.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.phase == ControllerState::ShuttingDown {
            return Ok(());
        }
        info!("[CTL] shutting down, {} requests unanswered", self.pending.len());
        self.phase = ControllerState::ShuttingDown;
        self.reactor.close();
        self.client.close()
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        self.tree.get(&self.state, path)
    }

    /// Write one leaf.
    ///
    /// Command leaves dispatch their command. Fields in a device group are
    /// stored and then pushed to the server on their own; if the push fails
    /// the stored value is rolled back. Other fields are local only.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let previous = device_group(path).map(|_| self.state.clone());
        match self.tree.set(&mut self.state, path, &value)? {
            SetOutcome::Command(verb) => self.command(verb),
            SetOutcome::Stored => {
                let Some(previous) = previous else {
                    return Ok(());
                };
                let mut params = Params::new();
                insert_nested(&mut params, path, self.tree.get(&self.state, path)?);
                if let Err(e) = self.dispatch(Message::config(params)) {
                    warn!("[CTL] push of '{}' failed, keeping old value: {}", path, e);
                    self.state = previous;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Fold one decoded reply into the local state.
    pub fn on_reply(&mut self, msg: Message) -> Result<()> {
        if !msg.is_reply() {
            return Err(Error::protocol(format!(
                "unexpected '{}' message '{}' id={} from server",
                msg.msg_type, msg.verb, msg.id
            )));
        }
        let Some(intent) = self.pending.resolve(msg.id) else {
            debug!("[CTL] discarding reply to unknown id={}", msg.id);
            return Ok(());
        };
        if intent.verb != msg.verb {
            warn!(
                "[CTL] reply id={} is for '{}', expected '{}'; discarded",
                msg.id, msg.verb, intent.verb
            );
            return Ok(());
        }

        match msg.msg_type {
            MsgType::Nack => warn!(
                "[CTL] '{}' id={} rejected: {}",
                msg.verb,
                msg.id,
                msg.error().unwrap_or("no reason given")
            ),
            MsgType::Ack if msg.verb == Verb::RequestConfiguration && !msg.params.is_empty() => {
                let stored = self
                    .tree
                    .merge_recursive(&mut self.state, "", &Value::Object(msg.params));
                trace!("[CTL] merged {} fields from id={}", stored, msg.id);
            }
            _ => trace!("[CTL] '{}' id={} acknowledged", msg.verb, msg.id),
        }
        Ok(())
    }

    /// Decode and apply one inbound frame. Bad frames are logged and dropped.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        if let Err(e) = message::decode(frame).and_then(|msg| self.on_reply(msg)) {
            warn!("[CTL] dropping frame: {}", e);
        }
    }

    fn poll(&mut self) {
        match self.request_configuration() {
            Ok(id) => trace!("[CTL] poll id={}", id),
            Err(e) => warn!("[CTL] poll skipped: {}", e),
        }
    }

    fn handle_request(&mut self, request: DetectorRequest) {
        let sent = match request {
            DetectorRequest::Get { path, reply } => reply.send(self.get(&path)).is_ok(),
            DetectorRequest::Set { path, value, reply } => {
                reply.send(self.set(&path, value)).is_ok()
            }
            DetectorRequest::Command { verb, reply } => reply.send(self.command(verb)).is_ok(),
            DetectorRequest::Reset { reply } => reply.send(self.reset()).is_ok(),
            DetectorRequest::PausePolling { reply } => {
                self.pause_polling();
                reply.send(Ok(())).is_ok()
            }
            DetectorRequest::ResumePolling { reply } => reply.send(self.resume_polling()).is_ok(),
            DetectorRequest::Shutdown { reply } => reply.send(self.shutdown()).is_ok(),
        };
        if !sent {
            debug!("[CTL] caller went away before the reply");
        }
    }

    fn sweep(&mut self) {
        for (id, intent) in self.pending.expire() {
            warn!(
                "[CTL] no reply to {} '{}' id={} within {:?}",
                intent.kind,
                intent.verb,
                id,
                self.pending.timeout()
            );
        }
    }

    fn handle_event(&mut self, event: Event) -> bool {
        self.sweep();
        match event {
            Event::Frame(frame) => self.handle_frame(&frame),
            Event::Request(request) => self.handle_request(request),
            Event::Poll => self.poll(),
            Event::Closed => return false,
        }
        true
    }

    /// Wait for and handle one event. Returns false once the reactor is closed.
    pub async fn step(&mut self) -> bool {
        let event = self.reactor.next_event().await;
        self.handle_event(event)
    }

    /// Handle every frame and request already queued without waiting.
    /// Returns how many were handled.
    pub fn process_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.reactor.try_next_event() {
            if !self.handle_event(event) {
                break;
            }
            handled += 1;
        }
        handled
    }

    /// Drive the controller until it is shut down.
    pub async fn run(&mut self) {
        while self.step().await {}
        debug!("[CTL] event loop stopped");
    }
}
