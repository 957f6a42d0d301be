//! # Data Logger
//!
//! Control-side facade tying the transport, ingest pipeline, session log and
//! profile store together.
//!
//! A [`DataLogger`] is driven from one control task. Its receive loop runs on
//! its own tokio task and reports back through the [`EventReceiver`] returned by
//! [`DataLogger::new`]; series data, statistics and connection state can also be
//! read directly at any time.
//!
//! # Examples
//!
//! ```no_run
//! use sensor_datalogger::channel::{Channel, TransformKind};
//! use sensor_datalogger::config::Config;
//! use sensor_datalogger::logger::DataLogger;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut logger, mut events) = DataLogger::new(Config::default());
//! logger.add_channel(Channel::new("Soil", 10_000.0, TransformKind::VoltageToResistance)?)?;
//! logger.connect().await?;
//! logger.set_auto_update(true).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::Local;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::channel::profile::ProfileStore;
use crate::channel::{Channel, ChannelRegistry};
use crate::config::Config;
use crate::error::{ChannelError, ConnectError, ProfileError, SendError};
use crate::events::{self, EventReceiver, EventSender};
use crate::pipeline::{lock, Ingest, IngestStats, SharedIngest};
use crate::series::{AxisBounds, Sample};
use crate::storage::{self, CsvSessionLog, RecordSink};
use crate::transport::connection::ReceiveContext;
use crate::transport::{BoxedStream, Connection, ConnectionState, Endpoint, LoopExit, StateCell};

/// Sensor datalogger session
pub struct DataLogger {
    config: Config,
    ingest: SharedIngest,
    state: StateCell,
    events: EventSender,
    connection: Option<Connection>,
    profiles: ProfileStore,
}

impl std::fmt::Debug for DataLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLogger")
            .field("state", &self.state.get())
            .field("connection", &self.connection)
            .field("profiles", &self.profiles)
            .finish_non_exhaustive()
    }
}

impl DataLogger {
    /// Creates a disconnected logger and the receiving end of its event queue.
    #[must_use]
    pub fn new(config: Config) -> (Self, EventReceiver) {
        let (events, rx) = events::channel(config.pipeline.event_queue_capacity);
        let profiles = ProfileStore::new(&config.profiles.path);

        let logger = Self {
            state: StateCell::new(events.clone()),
            ingest: Arc::new(Mutex::new(Ingest::new())),
            events,
            connection: None,
            profiles,
            config,
        };
        (logger, rx)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connects to the endpoint described by the `[transport]` section.
    ///
    /// # Errors
    ///
    /// See [`DataLogger::connect_to`].
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let endpoint = Endpoint::from_config(&self.config.transport);
        self.connect_to(&endpoint).await
    }

    /// Opens `endpoint` and starts a new session on it.
    ///
    /// A previous connection that was lost is released first. On failure the
    /// state returns to `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while a session is live, or
    /// the error from opening the endpoint.
    pub async fn connect_to(&mut self, endpoint: &Endpoint) -> Result<(), ConnectError> {
        self.begin_connect().await?;

        match endpoint.open(self.config.connect_timeout()).await {
            Ok(stream) => {
                self.start_session(stream, endpoint.to_string());
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                self.state.set(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Starts a session on an already-open stream.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while a session is live.
    pub async fn attach(
        &mut self,
        stream: BoxedStream,
        label: impl Into<String>,
    ) -> Result<(), ConnectError> {
        self.begin_connect().await?;
        self.start_session(stream, label.into());
        Ok(())
    }

    async fn begin_connect(&mut self) -> Result<(), ConnectError> {
        // Connecting without a live connection is only left behind by a
        // cancelled connect future, so it does not block a new attempt.
        let current = self.state.get();
        if current == ConnectionState::Connected {
            return Err(ConnectError::AlreadyConnected(current));
        }

        if let Some(previous) = self.connection.take() {
            self.release(previous).await;
        }

        self.state.set(ConnectionState::Connecting);
        Ok(())
    }

    fn start_session(&mut self, stream: BoxedStream, label: String) {
        let sink = self.open_session_log();
        lock(&self.ingest).set_sink(sink);

        let ctx = ReceiveContext {
            ingest: Arc::clone(&self.ingest),
            state: self.state.clone(),
            events: self.events.clone(),
            max_line_bytes: self.config.pipeline.max_line_bytes,
            read_buffer_size: self.config.transport.read_buffer_size,
        };
        self.connection = Some(Connection::start(stream, label, ctx));
    }

    fn open_session_log(&self) -> Option<Box<dyn RecordSink>> {
        if !self.config.storage.enabled {
            return None;
        }

        let session = storage::session_id(Local::now());
        match CsvSessionLog::open(&self.config.storage.log_dir, &session) {
            Ok(log) => Some(Box::new(log)),
            Err(e) => {
                warn!("Session log unavailable, continuing without it: {}", e);
                self.events.notice(
                    "Storage Error",
                    format!("Could not open session log in {}: {}", self.config.storage.log_dir, e),
                );
                None
            }
        }
    }

    async fn release(&mut self, connection: Connection) -> Option<LoopExit> {
        let exit = connection.close().await;
        lock(&self.ingest).set_sink(None);
        exit
    }

    /// Stops the receive loop and releases the link.
    ///
    /// Returns how the receive loop ended, or `None` if there was no connection.
    pub async fn disconnect(&mut self) -> Option<LoopExit> {
        match self.connection.take() {
            Some(connection) => self.release(connection).await,
            None => {
                self.state.set(ConnectionState::Disconnected);
                None
            }
        }
    }

    /// Sends a raw command to the device.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] without a live connection, and
    /// [`SendError::Transport`] if the write fails (the link is then `Lost`).
    pub async fn send(&self, command: &str) -> Result<(), SendError> {
        match &self.connection {
            Some(connection) => connection.send(command).await,
            None => Err(SendError::NotConnected),
        }
    }

    /// Toggles the device's periodic reporting.
    ///
    /// # Errors
    ///
    /// See [`DataLogger::send`].
    pub async fn set_auto_update(&self, on: bool) -> Result<(), SendError> {
        let command = if on {
            &self.config.commands.auto_update_on
        } else {
            &self.config.commands.auto_update_off
        };
        self.send(command).await
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Receiver that observes every connection state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// Adds a channel mapped to the next record field.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::RegistryFull`] once every field is mapped.
    pub fn add_channel(&self, channel: Channel) -> Result<usize, ChannelError> {
        let name = channel.name().to_string();
        let index = lock(&self.ingest).add_channel(channel)?;
        info!("Added channel {} ({}) for field {}", index, name, index + 1);
        Ok(index)
    }

    /// Snapshot of the configured channels, in field order
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        lock(&self.ingest).registry().list_channels().to_vec()
    }

    /// Clears every channel, its series and the session clock.
    pub fn reset(&self) {
        lock(&self.ingest).reset();
        info!("Channels and series reset");
    }

    /// Snapshot of one channel's series
    #[must_use]
    pub fn samples(&self, channel_index: usize) -> Option<Vec<Sample>> {
        lock(&self.ingest).samples(channel_index).map(<[Sample]>::to_vec)
    }

    #[must_use]
    pub fn axis_bounds(&self, channel_index: usize) -> Option<AxisBounds> {
        lock(&self.ingest).axis_bounds(channel_index)
    }

    #[must_use]
    pub fn stats(&self) -> IngestStats {
        lock(&self.ingest).stats()
    }

    /// Events dropped because the event queue was full
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Stores the current channels under `name`, keeping other profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile store cannot be written.
    pub fn save_profile(&self, name: &str) -> Result<(), ProfileError> {
        let channels = self.channels();
        self.profiles.save(name, &channels)?;
        info!("Saved profile {} with {} channels", name, channels.len());
        Ok(())
    }

    /// Replaces the current channels with the profile stored under `name`.
    ///
    /// The registry is only touched once the whole profile has been read and
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::NotFound`] for an unknown name, or an error if
    /// the store is unreadable or holds an invalid channel.
    pub fn load_profile(&self, name: &str) -> Result<usize, ProfileError> {
        let channels = self.profiles.load(name)?;
        if channels.len() > ChannelRegistry::CAPACITY {
            return Err(ChannelError::RegistryFull(ChannelRegistry::CAPACITY).into());
        }

        let mut ingest = lock(&self.ingest);
        ingest.reset();
        for channel in channels {
            ingest.add_channel(channel)?;
        }
        let count = ingest.registry().len();
        drop(ingest);

        info!("Loaded profile {} with {} channels", name, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransformKind;
    use crate::events::Event;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.log_dir = dir.path().join("Saved_Data").to_string_lossy().into_owned();
        config.profiles.path = dir
            .path()
            .join("configurations.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    async fn wait_for_accepted(logger: &DataLogger, count: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while logger.stats().accepted < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn wait_for_state(logger: &DataLogger, state: ConnectionState) {
        let mut rx = logger.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .unwrap()
            .unwrap();
    }

    fn csv_rows(dir: &TempDir) -> Vec<String> {
        let log_dir = dir.path().join("Saved_Data");
        let mut rows = Vec::new();
        for entry in std::fs::read_dir(log_dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("Data_Log_") && name.ends_with(".csv"));
            let contents = std::fs::read_to_string(&path).unwrap();
            rows.extend(contents.lines().map(str::to_string));
        }
        rows
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let dir = TempDir::new().unwrap();
        let (mut logger, mut events) = DataLogger::new(test_config(&dir));
        logger
            .add_channel(Channel::new("Soil", 10_000.0, TransformKind::VoltageToResistance).unwrap())
            .unwrap();
        logger
            .add_channel(Channel::with_preset("Air", TransformKind::Temperature).unwrap())
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        };

        let (connected, accepted) = tokio::join!(logger.connect_to(&endpoint), listener.accept());
        connected.unwrap();
        let (mut device, _) = accepted.unwrap();
        assert!(logger.is_connected());

        logger.set_auto_update(true).await.unwrap();
        let mut command = vec![0u8; "TOGGLE ON AUTOUPDATE".len()];
        device.read_exact(&mut command).await.unwrap();
        assert_eq!(command, b"TOGGLE ON AUTOUPDATE");

        // Split mid-record, one stale record, one malformed line
        device.write_all(b"1,1.65,21,0,0\n2,1.6").await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        device
            .write_all(b"5,22,0,0\n2,1.0,1,0,0\nbogus\n3,0.0,23,0,0\n")
            .await
            .unwrap();
        device.flush().await.unwrap();

        wait_for_accepted(&logger, 3).await;

        let soil = logger.samples(0).unwrap();
        assert_eq!(soil.len(), 3);
        assert!((soil[0].value - 10_000.0).abs() < 1e-6);
        assert_eq!(soil[2].value, 0.0);
        let air: Vec<u64> = logger.samples(1).unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(air, vec![1, 2, 3]);

        let stats = logger.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.malformed, 1);

        drop(device);
        wait_for_state(&logger, ConnectionState::Lost).await;
        assert_eq!(logger.disconnect().await, Some(LoopExit::PeerClosed));
        assert_eq!(logger.state(), ConnectionState::Disconnected);

        assert_eq!(
            csv_rows(&dir),
            vec!["1,1.65,21,0,0", "2,1.65,22,0,0", "3,0.0,23,0,0"]
        );

        let mut states = Vec::new();
        let mut lost_notice = false;
        while let Ok(event) = events.try_recv() {
            match event {
                Event::ConnectionStateChanged(state) => states.push(state),
                Event::Notice { title, .. } => lost_notice |= title == "Connection Lost",
                _ => {}
            }
        }
        assert!(lost_notice);
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Lost,
                ConnectionState::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_refused_stays_disconnected() {
        let dir = TempDir::new().unwrap();
        let (mut logger, mut events) = DataLogger::new(test_config(&dir));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        assert!(matches!(
            logger.connect_to(&endpoint).await,
            Err(ConnectError::Unreachable { .. })
        ));
        assert_eq!(logger.state(), ConnectionState::Disconnected);
        assert!(matches!(logger.send("X").await, Err(SendError::NotConnected)));

        assert_eq!(
            events.try_recv().unwrap(),
            Event::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            Event::ConnectionStateChanged(ConnectionState::Disconnected)
        );
        // No session file for a failed attempt
        assert!(!dir.path().join("Saved_Data").exists());
    }

    #[tokio::test]
    async fn test_attach_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (mut logger, _events) = DataLogger::new(test_config(&dir));

        let (client, _device) = tokio::io::duplex(64);
        logger.attach(Box::new(client), "duplex").await.unwrap();

        let (other, _other_device) = tokio::io::duplex(64);
        assert!(matches!(
            logger.attach(Box::new(other), "second").await,
            Err(ConnectError::AlreadyConnected(ConnectionState::Connected))
        ));

        assert_eq!(logger.disconnect().await, Some(LoopExit::Cancelled));
        assert!(!logger.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_after_loss() {
        let dir = TempDir::new().unwrap();
        let (mut logger, _events) = DataLogger::new(test_config(&dir));
        logger
            .add_channel(Channel::with_preset("V", TransformKind::Voltage).unwrap())
            .unwrap();

        let (client, mut device) = tokio::io::duplex(64);
        logger.attach(Box::new(client), "first").await.unwrap();
        device.write_all(b"1,1.0,0,0,0\n").await.unwrap();
        wait_for_accepted(&logger, 1).await;
        drop(device);
        wait_for_state(&logger, ConnectionState::Lost).await;

        let (client, mut device) = tokio::io::duplex(64);
        logger.attach(Box::new(client), "second").await.unwrap();
        assert!(logger.is_connected());

        // The session clock carries over between connections
        device.write_all(b"1,2.0,0,0,0\n2,3.0,0,0,0\n").await.unwrap();
        wait_for_accepted(&logger, 2).await;
        let values: Vec<f64> = logger.samples(0).unwrap().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);
        assert_eq!(logger.stats().rejected, 1);

        logger.disconnect().await;
    }

    #[tokio::test]
    async fn test_storage_disabled_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.storage.enabled = false;
        let (mut logger, _events) = DataLogger::new(config);

        let (client, mut device) = tokio::io::duplex(64);
        logger.attach(Box::new(client), "duplex").await.unwrap();
        device.write_all(b"1,0,0,0,0\n").await.unwrap();
        wait_for_accepted(&logger, 1).await;
        logger.disconnect().await;

        assert!(!dir.path().join("Saved_Data").exists());
        assert_eq!(logger.stats().persist_errors, 0);
    }

    #[tokio::test]
    async fn test_set_auto_update_off_sends_literal() {
        let dir = TempDir::new().unwrap();
        let (mut logger, _events) = DataLogger::new(test_config(&dir));
        assert!(matches!(
            logger.set_auto_update(false).await,
            Err(SendError::NotConnected)
        ));

        let (client, mut device) = tokio::io::duplex(64);
        logger.attach(Box::new(client), "duplex").await.unwrap();
        logger.set_auto_update(false).await.unwrap();

        let mut command = vec![0u8; "TOGGLE OFF AUTOUPDATE".len()];
        device.read_exact(&mut command).await.unwrap();
        assert_eq!(command, b"TOGGLE OFF AUTOUPDATE");
        logger.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let dir = TempDir::new().unwrap();
        let (mut logger, mut events) = DataLogger::new(test_config(&dir));
        assert_eq!(logger.disconnect().await, None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_profile_round_trip() {
        let dir = TempDir::new().unwrap();
        let (logger, _events) = DataLogger::new(test_config(&dir));
        logger
            .add_channel(Channel::new("Soil", 4700.0, TransformKind::VoltageToResistance).unwrap())
            .unwrap();
        logger
            .add_channel(Channel::with_preset("Humidity", TransformKind::Humidity).unwrap())
            .unwrap();
        logger.save_profile("greenhouse").unwrap();

        logger.reset();
        assert!(logger.channels().is_empty());

        assert_eq!(logger.load_profile("greenhouse").unwrap(), 2);
        let channels = logger.channels();
        assert_eq!(channels[0].name(), "Soil");
        assert_eq!(channels[0].display_limit(), 4700.0);
        assert_eq!(channels[1].transform(), TransformKind::Humidity);
        assert_eq!(logger.samples(1).unwrap().len(), 0);
    }

    #[test]
    fn test_load_unknown_profile_keeps_channels() {
        let dir = TempDir::new().unwrap();
        let (logger, _events) = DataLogger::new(test_config(&dir));
        logger
            .add_channel(Channel::with_preset("ADC", TransformKind::RawAdc).unwrap())
            .unwrap();

        assert!(matches!(
            logger.load_profile("missing"),
            Err(ProfileError::NotFound(_))
        ));
        assert_eq!(logger.channels().len(), 1);
    }

    #[test]
    fn test_registry_full() {
        let dir = TempDir::new().unwrap();
        let (logger, _events) = DataLogger::new(test_config(&dir));
        for i in 0..4 {
            let channel = Channel::new(format!("ch{}", i), 10.0, TransformKind::Identity).unwrap();
            assert_eq!(logger.add_channel(channel).unwrap(), i);
        }
        let extra = Channel::new("extra", 10.0, TransformKind::Identity).unwrap();
        assert!(matches!(
            logger.add_channel(extra),
            Err(ChannelError::RegistryFull(4))
        ));
    }
}
