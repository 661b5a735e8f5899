//! In-process RCON server simulating a block world, game rules and a day
//! clock. Used by the integration tests and for local runs of `ops`.

mod world;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rcon_proto::{frame_length, Frame, Packet, PacketType, AUTH_FAILED_ID, MAX_RESPONSE_FRAGMENT};
use tracing::{info, warn};

use world::Action;
pub use world::{Fault, MockWorld, TICKS_PER_DAY};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub password: String,
    /// Clock speed while `doDaylightCycle` is true. A vanilla server runs
    /// at 20.
    pub ticks_per_second: f64,
    /// Largest fill the server accepts.
    pub max_fill_blocks: u64,
    /// Added to every command response.
    pub latency: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            password: "secret".to_string(),
            ticks_per_second: 20.0,
            max_fill_blocks: 32_768,
            latency: Duration::ZERO,
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
    world: Arc<Mutex<MockWorld>>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Binds an ephemeral port on the loopback interface.
    pub fn start(config: MockConfig) -> io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), config)
    }

    pub fn bind(addr: SocketAddr, config: MockConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let world = Arc::new(Mutex::new(MockWorld::new(
            config.ticks_per_second,
            config.max_fill_blocks,
        )));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_thread = {
            let world = Arc::clone(&world);
            let shutdown = Arc::clone(&shutdown);
            let config = Arc::new(config);
            thread::spawn(move || accept_loop(listener, world, config, shutdown))
        };
        info!(%addr, "mock.listening");

        Ok(Self {
            addr,
            world,
            shutdown,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Locks the simulated world for inspection or fault setup.
    pub fn world(&self) -> MutexGuard<'_, MockWorld> {
        lock(&self.world)
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(world: &Mutex<MockWorld>) -> MutexGuard<'_, MockWorld> {
    world.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn accept_loop(
    listener: TcpListener,
    world: Arc<Mutex<MockWorld>>,
    config: Arc<MockConfig>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "mock.client_connected");
                let world = Arc::clone(&world);
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    if let Err(err) = serve_client(stream, &world, &config) {
                        warn!(%peer, error = %err, "mock.client_error");
                    }
                });
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => {
                warn!(error = %err, "mock.accept_failed");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn serve_client(mut stream: TcpStream, world: &Mutex<MockWorld>, config: &MockConfig) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut authenticated = false;
    loop {
        let packet = match read_packet(&mut stream) {
            Ok(packet) => packet,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };

        if packet.kind == PacketType::AUTH {
            if packet.body == config.password {
                authenticated = true;
                write_packet(&mut stream, &Packet::new(packet.id, PacketType::AUTH_RESPONSE, ""))?;
            } else {
                warn!("mock.auth_rejected");
                write_packet(
                    &mut stream,
                    &Packet::new(AUTH_FAILED_ID, PacketType::AUTH_RESPONSE, ""),
                )?;
                return Ok(());
            }
        } else if packet.kind == PacketType::EXEC_COMMAND && authenticated {
            let action = lock(world).handle(&packet.body);
            if !config.latency.is_zero() {
                thread::sleep(config.latency);
            }
            match action {
                Action::Reply(text) => write_response(&mut stream, packet.id, &text)?,
                Action::Delayed(delay, text) => {
                    thread::sleep(delay);
                    write_response(&mut stream, packet.id, &text)?;
                }
                Action::Disconnect => return Ok(()),
            }
        } else if packet.kind == PacketType::RESPONSE_VALUE && authenticated {
            // Not a command: vanilla servers echo the unknown type back.
            write_packet(&mut stream, &Packet::response(packet.id, "Unknown request 0"))?;
        } else {
            return Ok(());
        }
    }
}

fn read_packet(stream: &mut TcpStream) -> io::Result<Packet> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix)?;
    let len = frame_length(prefix).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let mut frame = vec![0u8; len];
    stream.read_exact(&mut frame)?;
    Packet::decode_frame(&frame).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn write_packet(stream: &mut TcpStream, packet: &Packet) -> io::Result<()> {
    stream.write_all(&packet.encode())?;
    stream.flush()
}

/// Long bodies go out as full-size fragments cut at byte offsets, the way
/// vanilla servers split them. A cut may land inside a character.
fn write_response(stream: &mut TcpStream, id: i32, text: &str) -> io::Result<()> {
    if text.is_empty() {
        return write_packet(stream, &Packet::response(id, ""));
    }
    for fragment in text.as_bytes().chunks(MAX_RESPONSE_FRAGMENT) {
        stream.write_all(&Frame::encode(id, PacketType::RESPONSE_VALUE, fragment))?;
    }
    stream.flush()
}
