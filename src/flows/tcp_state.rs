use crate::packet_features::{has_flag, ACK_FLAG, FIN_FLAG, RST_FLAG, SYN_FLAG};

/// Packet direction relative to the flow initiator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

/// One half of a TCP conversation, tracked from flag bits only.
///
/// Each flow owns two trackers, one per endpoint. A tracker advances on
/// every packet of the flow; `dir` is the tracker's own direction and
/// `pdir` the direction of the current packet, so SYN/FIN only count when
/// sent by this endpoint and the closing ACK only when sent by its peer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TcpState {
    #[default]
    Start,
    Syn,
    SynAck,
    Established,
    Fin,
    Closed,
}

impl TcpState {
    pub fn update(&mut self, flags: u8, dir: Direction, pdir: Direction) {
        if has_flag(flags, RST_FLAG) {
            *self = TcpState::Closed;
        } else if has_flag(flags, FIN_FLAG) && dir == pdir {
            *self = TcpState::Fin;
        } else if *self == TcpState::Fin {
            if has_flag(flags, ACK_FLAG) && dir != pdir {
                *self = TcpState::Closed;
            }
        } else if *self == TcpState::Start {
            if has_flag(flags, SYN_FLAG) && dir == pdir {
                *self = TcpState::Syn;
            }
        } else if *self == TcpState::Syn {
            if has_flag(flags, SYN_FLAG) && has_flag(flags, ACK_FLAG) && dir != pdir {
                *self = TcpState::SynAck;
            }
        } else if *self == TcpState::SynAck {
            if has_flag(flags, ACK_FLAG) && dir == pdir {
                *self = TcpState::Established;
            }
        }
    }
}
