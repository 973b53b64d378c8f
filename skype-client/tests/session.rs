//! End-to-end sessions against a scripted in-memory server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use skype_client::transport::parse_target;
use skype_client::{
    Authenticator, BoxFuture, BoxedSocket, Client, ClientError, Config, Connector, Credentials,
    Event, Group, ProtocolError, Purpose, Role, User,
};
use skype_proto::Envelope;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

// ─── Harness ──────────────────────────────────────────────────────────────────

/// Every `connect` opens a fresh in-memory pipe and hands the server end to
/// the test.
struct Network {
    accepted: mpsc::UnboundedSender<(String, u16, Server)>,
}

impl Network {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, u16, Server)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { accepted: tx }), rx)
    }
}

impl Connector for Network {
    fn connect<'a>(&'a self, host: &'a str, port: u16, purpose: Purpose)
        -> BoxFuture<'a, std::io::Result<BoxedSocket>>
    {
        Box::pin(async move {
            assert_eq!(purpose, Purpose::Session);
            let (client, server) = tokio::io::duplex(1 << 16);
            let _ = self.accepted.send((host.to_string(), port, Server { io: BufReader::new(server) }));
            Ok(Box::new(client) as BoxedSocket)
        })
    }
}

/// Mints `uic:<nonce>` and remembers the nonces it was asked for.
#[derive(Default)]
struct FakeAuth {
    nonces: Mutex<Vec<String>>,
}

impl Authenticator for FakeAuth {
    fn uic_token<'a>(&'a self, username: &'a str, secret: &'a str, nonce: &'a str)
        -> BoxFuture<'a, Result<String, ClientError>>
    {
        Box::pin(async move {
            assert_eq!((username, secret), ("alice", "pw"));
            self.nonces.lock().unwrap().push(nonce.to_string());
            Ok(format!("uic:{nonce}"))
        })
    }
}

#[derive(Debug)]
struct Sent {
    command: String,
    seq:     u32,
    params:  String,
    payload: String,
}

impl Sent {
    fn registration(&self) -> Option<&str> {
        self.payload
            .split("\r\n\r\n")
            .next()?
            .lines()
            .find_map(|l| l.strip_prefix("Registration: "))
    }
}

struct Server {
    io: BufReader<DuplexStream>,
}

impl Server {
    async fn recv(&mut self) -> Sent {
        let mut line = String::new();
        self.io.read_line(&mut line).await.unwrap();
        let parts: Vec<&str> = line.trim_end().split(' ').collect();
        let [command, seq, params, len] = parts.as_slice() else { panic!("bad header {line:?}") };
        let mut payload = vec![0u8; len.parse().unwrap()];
        self.io.read_exact(&mut payload).await.unwrap();
        Sent {
            command: command.to_string(),
            seq:     seq.parse().unwrap(),
            params:  params.to_string(),
            payload: String::from_utf8(payload).unwrap(),
        }
    }

    /// `headers` is zero or more complete `Name: value\r\n` lines.
    async fn reply(&mut self, command: &str, seq: u32, params: &str, headers: &str, body: &str) {
        let len = headers.len() + 2 + body.len();
        let wire = format!("{command} {seq} {params} {len}\r\n{headers}\r\n{body}");
        self.io.get_mut().write_all(wire.as_bytes()).await.unwrap();
    }

    async fn at_eof(&mut self) -> bool {
        let mut buf = [0u8; 16];
        matches!(self.io.read(&mut buf).await, Ok(0))
    }
}

fn config(network: Arc<Network>, auth: Arc<FakeAuth>) -> Config {
    Config {
        credentials: Credentials::password("alice", "pw"),
        connector: network,
        authenticator: Some(auth),
        ..Default::default()
    }
}

/// Answer everything from `CNT` to the recent-conversations listing.
async fn login(server: &mut Server, nonce: &str, carried: Option<&str>) {
    let cnt = server.recv().await;
    assert_eq!((cnt.command.as_str(), cnt.seq), ("CNT", 1));
    assert_eq!(cnt.registration(), carried);
    server
        .reply("CNT", cnt.seq, "CON", "", &format!("<connect-response><nonce>{nonce}</nonce></connect-response>"))
        .await;

    let ath = server.recv().await;
    assert_eq!(ath.command, "ATH");
    assert!(ath.payload.contains(&format!("<uic>uic:{nonce}</uic>")), "{ath:?}");
    server.reply("ATH", ath.seq, "CON\\USER", "Set-Registration: reg-1\r\n", "").await;

    let bnd = server.recv().await;
    assert_eq!(bnd.command, "BND");
    assert_eq!(bnd.registration(), Some("reg-1"));
    server.reply("BND", bnd.seq, "CON\\MSGR", "", "").await;

    let mut last = 0;
    for params in ["MSGR\\PRESENCE", "MSGR\\SUBSCRIPTIONS", "MSGR\\CONTACTS", "MSGR\\RECENTCONVERSATIONS"] {
        let sent = server.recv().await;
        assert_eq!(sent.params, params);
        last = sent.seq;
    }
    server
        .reply("GET", last, "MSGR", "", "<recentconversations-response></recentconversations-response>")
        .await;
}

async fn connected() -> (Client, skype_client::EventStream, Server, Arc<FakeAuth>) {
    let (network, mut accepted) = Network::new();
    let auth = Arc::new(FakeAuth::default());
    let connect = tokio::spawn(Client::connect(config(network, auth.clone())));

    let (host, port, mut server) = accepted.recv().await.unwrap();
    assert_eq!((host.as_str(), port), ("s.gateway.messenger.live.com", 443));
    login(&mut server, "n1", None).await;

    let (client, events) = connect.await.unwrap().unwrap();
    (client, events, server, auth)
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn logs_in_and_exchanges_messages() {
    let (client, mut events, mut server, auth) = connected().await;
    assert!(client.is_connected());
    assert_eq!(*auth.nonces.lock().unwrap(), ["n1"]);

    let env = Envelope::new("8:bob;epid={b}", "8:alice", "Messaging: 2.0", "hello <i>there</i>")
        .header("Content-Type", "application/user+xml")
        .header("Message-Type", "RichText");
    server.reply("SDG", 0, "MSGR", "", &env.format()).await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap();
    let Event::UserMessage { sender, message } = event else { panic!("expected a user message") };
    assert_eq!(sender, User::new("bob"));
    assert_eq!(message.text, "hello there");

    client.send_user_message(&sender, "hi bob").await.unwrap();
    let sdg = server.recv().await;
    assert_eq!((sdg.command.as_str(), sdg.params.as_str()), ("SDG", "MSGR"));
    assert_eq!(sdg.seq, 8);
    assert_eq!(sdg.registration(), Some("reg-1"));
    assert!(sdg.payload.contains("To: 8:bob\r\n"));
    assert!(sdg.payload.ends_with("hi bob"));
}

#[tokio::test]
async fn group_administration_goes_out_in_order() {
    let (client, _events, mut server, _auth) = connected().await;
    let group = Group::new("g");
    let bob = User::new("bob");

    client.add_user_to_group(&bob, Role::User, &group).await.unwrap();
    client.change_user_role(&bob, Role::Admin, &group).await.unwrap();
    client.remove_user_from_group(&bob, &group).await.unwrap();
    client.change_group_topic(&group, "Plans & <ideas>").await.unwrap();

    let sent: Vec<Sent> = [server.recv().await, server.recv().await, server.recv().await, server.recv().await].into();
    let lines: Vec<_> = sent.iter().map(|s| format!("{} {}", s.command, s.params)).collect();
    assert_eq!(lines, ["PUT MSGR\\THREAD", "PUT MSGR\\THREAD", "DEL MSGR\\THREAD", "PUT MSGR\\THREAD"]);
    assert!(sent[1].payload.contains("<role>admin</role>"));
    assert!(sent[3].payload.contains("Plans &amp; &lt;ideas&gt;"));
    assert!(sent.windows(2).all(|w| w[1].seq == w[0].seq + 1));
}

#[tokio::test]
async fn redirect_moves_to_a_new_socket() {
    let (network, mut accepted) = Network::new();
    let auth = Arc::new(FakeAuth::default());
    let connect = tokio::spawn(Client::connect(config(network, auth.clone())));

    let (_, _, mut first) = accepted.recv().await.unwrap();
    let cnt = first.recv().await;
    assert_eq!(cnt.command, "CNT");
    first
        .reply(
            "XFR",
            cnt.seq,
            "CON",
            "Set-Registration: reg-0\r\n",
            "<xfr><target>host.example.com:1234</target></xfr>",
        )
        .await;

    let (host, port, mut second) = accepted.recv().await.unwrap();
    assert_eq!((host.as_str(), port), ("host.example.com", 1234));
    assert!(first.at_eof().await);

    login(&mut second, "n2", Some("reg-0")).await;
    let (client, _events) = connect.await.unwrap().unwrap();
    assert!(client.is_connected());
    assert_eq!(*auth.nonces.lock().unwrap(), ["n2"]);
}

#[tokio::test]
async fn late_bind_acknowledgment_is_ignored() {
    let (client, mut events, mut server, _auth) = connected().await;
    server.reply("BND", 3, "CON\\MSGR", "", "").await;
    server.reply("PNG", 0, "CON", "", "").await;

    client.change_presence(skype_client::Presence::Busy).await.unwrap();
    let put = server.recv().await;
    assert_eq!(put.params, "MSGR\\PRESENCE");
    assert!(put.payload.contains("<Status>BSY</Status>"));
    assert!(tokio::time::timeout(Duration::from_millis(50), events.next()).await.is_err());
}

#[tokio::test]
async fn sign_out_from_the_server_is_reported() {
    let (client, mut events, mut server, _auth) = connected().await;
    server.reply("OUT", 0, "CON", "", "duplicate login").await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap();
    assert!(matches!(
        event,
        Event::Error(ClientError::Protocol(ProtocolError::SignedOut(ref reason))) if reason == "duplicate login"
    ));
    assert!(events.next().await.is_none());
    assert!(!client.is_connected());
    assert!(matches!(client.send_group_message(&Group::new("g"), "x").await, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn disconnect_is_idempotent_and_quiet() {
    let (client, mut events, mut server, _auth) = connected().await;

    client.disconnect().await;
    let out = server.recv().await;
    assert_eq!((out.command.as_str(), out.params.as_str()), ("OUT", "CON"));
    assert!(server.at_eof().await);

    client.disconnect().await;
    drop(server);
    assert!(events.next().await.is_none());
    assert!(matches!(client.send_user_message(&User::new("bob"), "x").await, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn missing_nonce_fails_connect() {
    let (network, mut accepted) = Network::new();
    let connect = tokio::spawn(Client::connect(config(network, Arc::new(FakeAuth::default()))));

    let (_, _, mut server) = accepted.recv().await.unwrap();
    let cnt = server.recv().await;
    server.reply("CNT", cnt.seq, "CON", "", "<connect-response></connect-response>").await;

    let err = connect.await.unwrap().err().unwrap();
    assert!(matches!(err, ClientError::Protocol(ProtocolError::MissingField("nonce"))));
}

#[tokio::test]
async fn server_error_code_fails_connect() {
    let (network, mut accepted) = Network::new();
    let connect = tokio::spawn(Client::connect(config(network, Arc::new(FakeAuth::default()))));

    let (_, _, mut server) = accepted.recv().await.unwrap();
    let cnt = server.recv().await;
    server.reply("911", cnt.seq, "CON", "", "").await;

    let err = connect.await.unwrap().err().unwrap();
    assert!(err.is_fatal());
    assert!(matches!(err, ClientError::Protocol(ProtocolError::ServerError { .. })));
}

// ─── Redirect targets ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn well_formed_targets_parse(host in "[a-z0-9][a-z0-9.]{0,30}", port: u16) {
        let parsed = parse_target(&format!("{host}:{port}"));
        prop_assert_eq!(parsed, Some((host, port)));
    }

    #[test]
    fn targets_with_other_characters_are_rejected(host in "[a-z]{1,8}[-_ /@][a-z]{1,8}", port: u16) {
        prop_assert_eq!(parse_target(&format!("{host}:{port}")), None);
    }
}
