//! The graph-edit message vocabulary.

use crate::status::Status;
use ensemble_core::{Atom, Context, Path, Properties, Uri};
use serde::{Deserialize, Serialize};

/// Sequence number of a request. Zero asks for no response.
pub type Seq = i32;

/// One protocol message.
///
/// Requests carry the sender's sequence number; `Response` echoes the id of
/// the request it answers and `Error` reports a failure nobody asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Message {
    BundleBegin {
        seq: Seq,
    },
    BundleEnd {
        seq: Seq,
    },
    /// Create an object, or overwrite the given keys of an existing one.
    Put {
        seq: Seq,
        uri: Uri,
        properties: Properties,
        ctx: Context,
    },
    /// Remove then add individual property values.
    Delta {
        seq: Seq,
        uri: Uri,
        remove: Properties,
        add: Properties,
        ctx: Context,
    },
    Copy {
        seq: Seq,
        from: Uri,
        to: Uri,
    },
    Move {
        seq: Seq,
        from: Path,
        to: Path,
    },
    Del {
        seq: Seq,
        uri: Uri,
    },
    Connect {
        seq: Seq,
        tail: Path,
        head: Path,
    },
    Disconnect {
        seq: Seq,
        tail: Path,
        head: Path,
    },
    /// Remove every arc in `graph` touching `path`.
    DisconnectAll {
        seq: Seq,
        graph: Path,
        path: Path,
    },
    SetProperty {
        seq: Seq,
        subject: Uri,
        key: Uri,
        value: Atom,
        ctx: Context,
    },
    Get {
        seq: Seq,
        uri: Uri,
    },
    Undo {
        seq: Seq,
    },
    Redo {
        seq: Seq,
    },
    Response {
        id: Seq,
        status: Status,
        subject: String,
    },
    Error {
        text: String,
    },
}

impl Message {
    /// Sequence number of a request, `None` for responses and errors.
    pub fn seq(&self) -> Option<Seq> {
        match self {
            Message::BundleBegin { seq }
            | Message::BundleEnd { seq }
            | Message::Put { seq, .. }
            | Message::Delta { seq, .. }
            | Message::Copy { seq, .. }
            | Message::Move { seq, .. }
            | Message::Del { seq, .. }
            | Message::Connect { seq, .. }
            | Message::Disconnect { seq, .. }
            | Message::DisconnectAll { seq, .. }
            | Message::SetProperty { seq, .. }
            | Message::Get { seq, .. }
            | Message::Undo { seq }
            | Message::Redo { seq } => Some(*seq),
            Message::Response { .. } | Message::Error { .. } => None,
        }
    }

    /// Replace the sequence number of a request; responses are unchanged.
    pub fn with_seq(mut self, new_seq: Seq) -> Self {
        match &mut self {
            Message::BundleBegin { seq }
            | Message::BundleEnd { seq }
            | Message::Put { seq, .. }
            | Message::Delta { seq, .. }
            | Message::Copy { seq, .. }
            | Message::Move { seq, .. }
            | Message::Del { seq, .. }
            | Message::Connect { seq, .. }
            | Message::Disconnect { seq, .. }
            | Message::DisconnectAll { seq, .. }
            | Message::SetProperty { seq, .. }
            | Message::Get { seq, .. }
            | Message::Undo { seq }
            | Message::Redo { seq } => *seq = new_seq,
            Message::Response { .. } | Message::Error { .. } => {}
        }
        self
    }

    /// Short operation name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::BundleBegin { .. } => "bundle_begin",
            Message::BundleEnd { .. } => "bundle_end",
            Message::Put { .. } => "put",
            Message::Delta { .. } => "delta",
            Message::Copy { .. } => "copy",
            Message::Move { .. } => "move",
            Message::Del { .. } => "del",
            Message::Connect { .. } => "connect",
            Message::Disconnect { .. } => "disconnect",
            Message::DisconnectAll { .. } => "disconnect_all",
            Message::SetProperty { .. } => "set_property",
            Message::Get { .. } => "get",
            Message::Undo { .. } => "undo",
            Message::Redo { .. } => "redo",
            Message::Response { .. } => "response",
            Message::Error { .. } => "error",
        }
    }

    /// The object a request is about, used as the subject of its response.
    pub fn subject(&self) -> String {
        match self {
            Message::Put { uri, .. }
            | Message::Delta { uri, .. }
            | Message::Del { uri, .. }
            | Message::Get { uri, .. } => uri.to_string(),
            Message::Copy { to, .. } => to.to_string(),
            Message::Move { from, .. } => from.to_string(),
            Message::Connect { tail, head, .. } | Message::Disconnect { tail, head, .. } => {
                format!("{tail} -> {head}")
            }
            Message::DisconnectAll { path, .. } => path.to_string(),
            Message::SetProperty { subject, .. } => subject.to_string(),
            Message::Response { subject, .. } => subject.clone(),
            Message::BundleBegin { .. }
            | Message::BundleEnd { .. }
            | Message::Undo { .. }
            | Message::Redo { .. }
            | Message::Error { .. } => String::new(),
        }
    }

    /// `SetProperty` expressed as the equivalent `Delta`.
    pub fn set_property_as_delta(subject: Uri, key: Uri, value: Atom, ctx: Context) -> Message {
        Message::Delta {
            seq: 0,
            uri: subject,
            remove: Properties::new().with(
                key.clone(),
                Atom::uri(ensemble_core::uris::WILDCARD),
            ),
            add: Properties::new().with(key, value),
            ctx,
        }
    }
}
