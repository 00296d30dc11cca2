//! Minimal ra_svn client driving a session over an in-memory pipe

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use gitsvn::server::{ServerState, Session};
use gitsvn::wire::{Token, WireReader, WireWriter};

/// Parsed response item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Word(String),
    Number(u64),
    Str(Vec<u8>),
    List(Vec<Item>),
}

impl Item {
    pub fn list(&self) -> &[Item] {
        match self {
            Item::List(items) => items,
            other => panic!("expected list, got {:?}", other),
        }
    }

    pub fn word(&self) -> &str {
        match self {
            Item::Word(word) => word,
            other => panic!("expected word, got {:?}", other),
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Item::Number(number) => *number,
            other => panic!("expected number, got {:?}", other),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Item::Str(bytes) => bytes,
            other => panic!("expected string, got {:?}", other),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }
}

/// `text` as a length-prefixed wire string
pub fn s(text: &str) -> String {
    format!("{}:{}", text.len(), text)
}

pub struct TestClient {
    reader: WireReader,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Session task when it runs in-process
    session: Option<JoinHandle<gitsvn::Result<()>>>,
}

impl TestClient {
    /// Start a session and connect to it without any handshake
    pub fn connect(state: Arc<ServerState>) -> Self {
        let (client, server) = tokio::io::duplex(1 << 20);
        let (server_read, server_write) = tokio::io::split(server);
        let session = Session::new(1, state, WireReader::new(server_read), WireWriter::new(server_write));
        let session = tokio::spawn(session.run());

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            reader: WireReader::new(client_read),
            writer: Box::new(client_write),
            session: Some(session),
        }
    }

    /// Connect to a listening server
    pub async fn connect_tcp(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (read, write) = stream.into_split();
        Self {
            reader: WireReader::new(read),
            writer: Box::new(write),
            session: None,
        }
    }

    /// Log in anonymously on an established connection
    pub async fn login(&mut self, url: &str) -> Vec<Item> {
        self.read_success().await;
        self.send_client_info(2, url).await;
        self.read_success().await;
        self.send("( ANONYMOUS ( 0: ) ) ").await;
        self.read_success().await;
        self.read_success().await
    }

    /// Connect, log in anonymously and return the announce parameters
    pub async fn open(state: Arc<ServerState>, url: &str) -> (Self, Vec<Item>) {
        let mut client = Self::connect(state);
        let announce = client.login(url).await;
        (client, announce)
    }

    pub async fn send(&mut self, raw: &str) {
        self.writer
            .write_all(raw.as_bytes())
            .await
            .expect("Failed to write to session");
    }

    pub async fn send_client_info(&mut self, version: u64, url: &str) {
        let info = format!("( {} ( edit-pipeline svndiff1 ) {} {} ( ) ) ", version, s(url), s("SVN/1.14.2 test"));
        self.send(&info).await;
    }

    pub async fn read(&mut self) -> Item {
        let mut stack: Vec<Vec<Item>> = Vec::new();
        loop {
            let token = self.reader.read_token().await.expect("Failed to read response");
            let item = match token {
                Token::ListBegin => {
                    stack.push(Vec::new());
                    continue;
                }
                Token::ListEnd => Item::List(stack.pop().expect("unbalanced list")),
                Token::Word(word) => Item::Word(word),
                Token::Number(number) => Item::Number(number),
                Token::Str(bytes) => Item::Str(bytes),
            };
            match stack.last_mut() {
                Some(parent) => parent.push(item),
                None => return item,
            }
        }
    }

    /// Read `( success ( params... ) )` and return the params
    pub async fn read_success(&mut self) -> Vec<Item> {
        let item = self.read().await;
        let parts = item.list();
        assert_eq!(parts[0].word(), "success", "unexpected response {:?}", item);
        parts[1].list().to_vec()
    }

    /// Read `( failure ( ( code message file line )... ) )` and return the
    /// first code and message
    pub async fn read_failure(&mut self) -> (u64, String) {
        let item = self.read().await;
        let parts = item.list();
        assert_eq!(parts[0].word(), "failure", "unexpected response {:?}", item);
        let error = parts[1].list()[0].list();
        (error[0].number(), error[1].text())
    }

    /// Handshake failure `( failure ( message ) )`
    pub async fn read_failure_message(&mut self) -> String {
        let item = self.read().await;
        let parts = item.list();
        assert_eq!(parts[0].word(), "failure", "unexpected response {:?}", item);
        parts[1].list()[0].text()
    }

    /// Send a command and consume the empty auth request that precedes its response
    pub async fn command(&mut self, raw: &str) {
        self.send(raw).await;
        let auth = self.read_success().await;
        assert_eq!(auth, vec![Item::List(vec![]), Item::Str(Vec::new())]);
    }

    /// Read editor commands up to and including `close-edit`
    pub async fn read_edit(&mut self) -> Vec<(String, Vec<Item>)> {
        let mut commands = Vec::new();
        loop {
            let item = self.read().await;
            let parts = item.list();
            let name = parts[0].word().to_string();
            let args = parts[1].list().to_vec();
            let done = name == "close-edit" || name == "abort-edit";
            commands.push((name, args));
            if done {
                return commands;
            }
        }
    }

    /// True once the server has closed the connection
    pub async fn at_eof(&mut self) -> bool {
        matches!(self.reader.read_token().await, Err(gitsvn::SvnError::Disconnected))
    }

    /// Hang up and return how the session ended
    pub async fn close(mut self) -> gitsvn::Result<()> {
        let _ = self.writer.shutdown().await;
        match self.session.take() {
            Some(session) => session.await.expect("Session task panicked"),
            None => Ok(()),
        }
    }
}
