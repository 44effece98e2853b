use std::net::{IpAddr, Ipv4Addr};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

/// A root server entry.
#[derive(Debug, Clone, Copy)]
pub struct RootServer {
    pub name: &'static str,
    pub ipv4: Ipv4Addr,
}

/// IANA root hints (named.root, last changed with the b.root renumbering in 2023).
pub static ROOT_HINTS: [RootServer; 13] = [
    RootServer {
        name: "a.root-servers.net.",
        ipv4: Ipv4Addr::new(198, 41, 0, 4),
    },
    RootServer {
        name: "b.root-servers.net.",
        ipv4: Ipv4Addr::new(170, 247, 170, 2),
    },
    RootServer {
        name: "c.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 33, 4, 12),
    },
    RootServer {
        name: "d.root-servers.net.",
        ipv4: Ipv4Addr::new(199, 7, 91, 13),
    },
    RootServer {
        name: "e.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 203, 230, 10),
    },
    RootServer {
        name: "f.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 5, 5, 241),
    },
    RootServer {
        name: "g.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 112, 36, 4),
    },
    RootServer {
        name: "h.root-servers.net.",
        ipv4: Ipv4Addr::new(198, 97, 190, 53),
    },
    RootServer {
        name: "i.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 36, 148, 17),
    },
    RootServer {
        name: "j.root-servers.net.",
        ipv4: Ipv4Addr::new(192, 58, 128, 30),
    },
    RootServer {
        name: "k.root-servers.net.",
        ipv4: Ipv4Addr::new(193, 0, 14, 129),
    },
    RootServer {
        name: "l.root-servers.net.",
        ipv4: Ipv4Addr::new(199, 7, 83, 42),
    },
    RootServer {
        name: "m.root-servers.net.",
        ipv4: Ipv4Addr::new(202, 12, 27, 33),
    },
];

/// Picks the root server a resolution starts from.
pub struct RootSelector<R> {
    rng: R,
}

impl<R: Rng> RootSelector<R> {
    pub fn new(rng: R) -> Self {
        RootSelector { rng }
    }

    /// Uniformly random root server IPv4 address.
    pub fn pick(&mut self) -> IpAddr {
        let server = ROOT_HINTS
            .choose(&mut self.rng)
            .unwrap_or(&ROOT_HINTS[0]);
        trace!(root = server.name, "Starting from root server");
        IpAddr::V4(server.ipv4)
    }
}

#[cfg(test)]
pub fn is_root(addr: IpAddr) -> bool {
    ROOT_HINTS
        .iter()
        .any(|s| IpAddr::V4(s.ipv4) == addr)
}
