use crate::{
    messages::{Message, MAX_SECTION_LEN},
    Dispatcher, Endpoint, InternodeError, MessagingService,
};
use std::{
    io::{self, Read, Write},
    net::{TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Sends every message over its own short-lived TCP connection.
///
/// Each frame on the wire is a big-endian `u32` length followed by the
/// encoded [`Message`].
pub struct TcpMessagingService {
    connect_timeout: Duration,
}

impl TcpMessagingService {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Default for TcpMessagingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagingService for TcpMessagingService {
    fn send_one_way(&self, message: Message, to: Endpoint) -> Result<(), InternodeError> {
        let bytes = message.as_bytes()?;
        let mut stream = TcpStream::connect_timeout(&to.socket_addr(), self.connect_timeout)?;
        write_frame(&mut stream, &bytes)?;
        stream.flush()?;
        Ok(())
    }
}

/// Accepts connections from other nodes and hands every decoded message to the dispatcher.
pub struct InternodeLink {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl InternodeLink {
    /// Binds the listening socket for `endpoint`.
    pub fn bind(endpoint: Endpoint, dispatcher: Arc<Dispatcher>) -> Result<Self, InternodeError> {
        let listener = TcpListener::bind(endpoint.socket_addr())?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// The endpoint actually bound, useful when binding to port 0.
    pub fn local_endpoint(&self) -> Result<Endpoint, InternodeError> {
        Ok(Endpoint::from(self.listener.local_addr()?))
    }

    /// Spawns the accept loop. Each connection is read on its own thread.
    pub fn start(self) -> JoinHandle<()> {
        thread::spawn(move || {
            for stream in self.listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "failed to accept internode connection");
                        continue;
                    }
                };

                let dispatcher = self.dispatcher.clone();
                thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, &dispatcher) {
                        debug!(error = %e, "internode connection closed with error");
                    }
                });
            }
        })
    }
}

fn serve_connection(mut stream: TcpStream, dispatcher: &Dispatcher) -> Result<(), InternodeError> {
    while let Some(frame) = read_frame(&mut stream)? {
        let message = Message::from_bytes(&frame)?;
        if let Err(e) = dispatcher.dispatch(message) {
            warn!(error = %e, "dropping inbound message");
        }
    }
    Ok(())
}

fn write_frame(stream: &mut impl Write, bytes: &[u8]) -> Result<(), InternodeError> {
    if bytes.len() > 2 * MAX_SECTION_LEN {
        return Err(InternodeError::FrameTooLarge(bytes.len()));
    }
    stream.write_all(&(bytes.len() as u32).to_be_bytes())?;
    stream.write_all(bytes)?;
    Ok(())
}

/// Reads one frame; `None` on a clean end of stream.
fn read_frame(stream: &mut impl Read) -> Result<Option<Vec<u8>>, InternodeError> {
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > 2 * MAX_SECTION_LEN {
        return Err(InternodeError::FrameTooLarge(len));
    }

    let mut frame = vec![0u8; len];
    stream.read_exact(&mut frame)?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Stage, Verb, VerbHandler};
    use std::sync::mpsc::{self, Sender};

    struct Forward(parking_lot::Mutex<Sender<Message>>);

    impl VerbHandler for Forward {
        fn do_verb(&self, message: Message) {
            let _ = self.0.lock().send(message);
        }
    }

    #[test]
    fn frames_read_back_in_order() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"first").unwrap();
        write_frame(&mut buffer, b"second").unwrap();

        let mut reader = io::Cursor::new(buffer);
        assert_eq!(read_frame(&mut reader).unwrap(), Some(b"first".to_vec()));
        assert_eq!(read_frame(&mut reader).unwrap(), Some(b"second".to_vec()));
        assert_eq!(read_frame(&mut reader).unwrap(), None);
    }

    #[test]
    fn message_travels_over_tcp() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher::new().with_handler(
            Stage::Gossip,
            Verb::GossipDigestSyn,
            Arc::new(Forward(parking_lot::Mutex::new(tx))),
        );

        let link = InternodeLink::bind(Endpoint::v4(127, 0, 0, 1, 0), Arc::new(dispatcher)).unwrap();
        let to = link.local_endpoint().unwrap();
        link.start();

        let message = Message::new(
            Endpoint::v4(127, 0, 0, 1, 7000),
            Stage::Gossip,
            Verb::GossipDigestSyn,
            b"hello".to_vec(),
        );
        TcpMessagingService::new()
            .send_one_way(message.clone(), to)
            .unwrap();

        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, message);
    }
}
