//! Resource download state machine.
//!
//! Two phases: connect (negotiate a URL, check cache currency) then download.
//! `DownloadPending` is only reachable after a successful connect, so it
//! stands for "connected, download requested". `Downloaded` and `Error` are
//! terminal.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Uninitialized,
    ConnectPending,
    Connecting,
    /// Negotiated, no download requested yet.
    Connected,
    DownloadPending,
    Downloading,
    Downloaded,
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal resource transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ResourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceState::Downloaded | ResourceState::Error)
    }

    /// A worker is currently handling this resource.
    pub fn is_active(self) -> bool {
        matches!(self, ResourceState::Connecting | ResourceState::Downloading)
    }

    pub fn needs_connect(self) -> bool {
        self == ResourceState::ConnectPending
    }

    pub fn needs_download(self) -> bool {
        self == ResourceState::DownloadPending
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ResourceState::Connected
                | ResourceState::DownloadPending
                | ResourceState::Downloading
                | ResourceState::Downloaded
        )
    }

    /// Transition table. Anything not listed is illegal.
    pub fn can_move_to(self, to: ResourceState) -> bool {
        use ResourceState::*;
        if to == Error {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Uninitialized, ConnectPending)
                | (Uninitialized, Downloaded)
                | (ConnectPending, Connecting)
                | (Connecting, Connected)
                | (Connecting, DownloadPending)
                | (Connecting, Downloaded)
                | (Connected, DownloadPending)
                | (DownloadPending, Downloading)
                | (Downloading, Downloaded)
        )
    }

    pub fn transition(self, to: ResourceState) -> Result<ResourceState, TransitionError> {
        if self.can_move_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Uninitialized => "UNINITIALIZED",
            ResourceState::ConnectPending => "CONNECT",
            ResourceState::Connecting => "CONNECTING",
            ResourceState::Connected => "CONNECTED",
            ResourceState::DownloadPending => "CONNECTED|DOWNLOAD",
            ResourceState::Downloading => "DOWNLOADING",
            ResourceState::Downloaded => "DOWNLOADED",
            ResourceState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceState::*;
    use super::*;

    const ALL: [ResourceState; 8] = [
        Uninitialized,
        ConnectPending,
        Connecting,
        Connected,
        DownloadPending,
        Downloading,
        Downloaded,
        Error,
    ];

    #[test]
    fn terminal_states_never_move() {
        for from in [Downloaded, Error] {
            for to in ALL {
                assert!(!from.can_move_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn full_path_is_legal() {
        let mut s = Uninitialized;
        for next in [ConnectPending, Connecting, Connected, DownloadPending, Downloading, Downloaded] {
            s = s.transition(next).unwrap();
        }
        assert_eq!(s, Downloaded);
    }

    #[test]
    fn no_phase_goes_backwards() {
        assert!(Connected.transition(ConnectPending).is_err());
        assert!(Downloading.transition(DownloadPending).is_err());
        assert!(DownloadPending.transition(Connecting).is_err());
        assert_eq!(
            Downloading.transition(Connected),
            Err(TransitionError { from: Downloading, to: Connected })
        );
    }

    #[test]
    fn error_reachable_from_any_live_state() {
        for from in ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_move_to(Error));
        }
    }
}
