//! Builders for every packet the client sends.
//!
//! Each returns a [`Packet`]; sequence numbers and the registration header
//! are added at send time by the session.

use skype_crypto::challenge;
use skype_proto::message::sanitize;
use skype_proto::xml::escape;
use skype_proto::{Envelope, Packet, Presence, Role, WireIdentity};

use crate::resolver::{Group, User};

const CONNECT: &str =
    "<connect><ver>2</ver><agent><os>.</os><osVer>.</osVer><proc>.</proc><lcid>en-us</lcid></agent></connect>";

const SUBSCRIBE: &str =
    "<subscribe><presence><buddies><all /></buddies></presence><messaging><im /><conversations /></messaging></subscribe>";

const RECENT_CONVERSATIONS: &str =
    "<recentconversations><start>0</start><pagesize>100</pagesize></recentconversations>";

/// `8:<username>;epid={<epid>}`, the sender of everything we publish.
pub fn endpoint(username: &str, epid: &str) -> String {
    format!("{};epid={{{epid}}}", WireIdentity::user(username))
}

// ─── Session setup ────────────────────────────────────────────────────────────

pub fn connect() -> Packet {
    Packet::new("CNT", "CON", CONNECT)
}

/// `ATH`, with the federation ticket when the account has one.
pub fn authenticate(username: &str, uic: &str, federation_token: Option<&str>) -> Packet {
    let ticket = federation_token
        .map(|t| format!("<ssl-compact-ticket>t={}</ssl-compact-ticket>", escape(t)))
        .unwrap_or_default();
    Packet::new(
        "ATH",
        "CON\\USER",
        format!("<user>{ticket}<uic>{uic}</uic><id>{}</id></user>", escape(username)),
    )
}

pub fn bind(epid: &str) -> Packet {
    Packet::new(
        "BND",
        "CON\\MSGR",
        format!(
            "<msgr><ver>2</ver><client><name>.</name><ver>.</ver><networks>skype</networks></client>\
             <epid>{epid}</epid></msgr>"
        ),
    )
}

/// Answer to the legacy nonce some servers still put in `BND`.
pub fn challenge_response(nonce: &str) -> Packet {
    Packet::new(
        "PUT",
        "MSGR\\CHALLENGE",
        format!(
            "<challenge><appId>{}</appId><response>{}</response></challenge>",
            escape(challenge::PRODUCT_ID),
            challenge::solve(nonce),
        ),
    )
}

/// Full presence publication sent right after binding.
pub fn publish_presence(username: &str, epid: &str, presence: Presence) -> Packet {
    let body = format!(
        "<user><s n=\"IM\"><Status>{status}</Status></s>\
         <sep n=\"IM\" epid=\"{{{epid}}}\"><Capabilities>0:4194560</Capabilities></sep>\
         <s n=\"SKP\"><Mood/><Skypename>{name}</Skypename></s>\
         <sep n=\"SKP\" epid=\"{{{epid}}}\"><Version>.</Version><Seamless>true</Seamless></sep></user>",
        status = presence.as_str(),
        name = escape(username),
    );
    publication(username, epid, body)
}

/// Short presence publication for a status change.
pub fn change_presence(username: &str, epid: &str, presence: Presence) -> Packet {
    let body = format!("<user><s n=\"IM\"><Status>{}</Status></s></user>", presence.as_str());
    publication(username, epid, body)
}

fn publication(username: &str, epid: &str, body: String) -> Packet {
    let env = Envelope::new(endpoint(username, epid), WireIdentity::user(username).to_string(), "Publication: 1.0", body)
        .header("Uri", "/user")
        .header("Content-Type", "application/user+xml");
    Packet::new("PUT", "MSGR\\PRESENCE", env.format())
}

pub fn subscribe() -> Packet {
    Packet::new("PUT", "MSGR\\SUBSCRIPTIONS", SUBSCRIBE)
}

pub fn contacts(users: &[User]) -> Packet {
    let mut body = String::from("<ml l=\"1\"><skp>");
    for user in users {
        body.push_str(&format!(
            "<c n=\"{}\" t=\"8\"><s l=\"3\" n=\"IM\"/><s l=\"3\" n=\"SKP\"/></c>",
            escape(&user.username),
        ));
    }
    body.push_str("</skp></ml>");
    Packet::new("PUT", "MSGR\\CONTACTS", body)
}

pub fn recent_conversations() -> Packet {
    Packet::new("GET", "MSGR\\RECENTCONVERSATIONS", RECENT_CONVERSATIONS)
}

pub fn threads(groups: &[Group]) -> Packet {
    let mut body = String::from("<threads>");
    for group in groups {
        body.push_str(&format!("<thread><id>{}</id></thread>", escape(&group.wire().to_string())));
    }
    body.push_str("</threads>");
    Packet::new("GET", "MSGR\\THREADS", body)
}

// ─── Keepalive / teardown ─────────────────────────────────────────────────────

pub fn ping() -> Packet {
    Packet::new("PNG", "CON", Vec::new())
}

pub fn active_endpoint(epid: &str) -> Packet {
    Packet::new(
        "PUT",
        "MSGR\\ACTIVEENDPOINT",
        format!("<activeendpoint><epid>{{{epid}}}</epid></activeendpoint>"),
    )
}

pub fn sign_out() -> Packet {
    Packet::new("OUT", "CON", Vec::new())
}

// ─── Messaging and group administration ───────────────────────────────────────

/// A rich-text message to a user or group.
pub fn message(username: &str, epid: &str, to: &WireIdentity, text: &str) -> Packet {
    let env = Envelope::new(endpoint(username, epid), to.to_string(), "Messaging: 2.0", sanitize(text))
        .header("Content-Type", "application/user+xml")
        .header("Message-Type", "RichText");
    Packet::new("SDG", "MSGR", env.format())
}

fn member(user: &User, role: Option<Role>) -> String {
    let role = role.map(|r| format!("<role>{}</role>", r.as_str())).unwrap_or_default();
    format!("<members><member><mri>{}</mri>{role}</member></members>", escape(&user.wire().to_string()))
}

fn thread(group: &Group, inner: &str) -> String {
    format!("<thread><id>{}</id>{inner}</thread>", escape(&group.wire().to_string()))
}

pub fn add_member(group: &Group, user: &User, role: Role) -> Packet {
    Packet::new("PUT", "MSGR\\THREAD", thread(group, &member(user, Some(role))))
}

/// Same wire form as [`add_member`]; the server updates an existing member.
pub fn change_role(group: &Group, user: &User, role: Role) -> Packet {
    add_member(group, user, role)
}

pub fn remove_member(group: &Group, user: &User) -> Packet {
    Packet::new("DEL", "MSGR\\THREAD", thread(group, &member(user, None)))
}

pub fn topic(group: &Group, topic: &str) -> Packet {
    let props = format!("<properties><topic>{}</topic></properties>", escape(&sanitize(topic)));
    Packet::new("PUT", "MSGR\\THREAD", thread(group, &props))
}
