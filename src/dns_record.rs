use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordType {
    A,     // Host Address
    NS,    // an authoritative name server
    CNAME, // the canonical name for an alias
    SOA,   // marks the start of a zone of authority
    AAAA,  // IPv6 host address (RFC 3596)
    Unknown(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::AAAA => 28,
            RecordType::Unknown(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            28 => RecordType::AAAA,
            _ => RecordType::Unknown(code),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::NS => f.write_str("NS"),
            RecordType::CNAME => f.write_str("CNAME"),
            RecordType::SOA => f.write_str("SOA"),
            RecordType::AAAA => f.write_str("AAAA"),
            RecordType::Unknown(code) => write!(f, "TYPE{code}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid record type: {0}")]
pub struct InvalidRecordType(pub String);

/// Only the types a lookup can be started for are accepted here.
impl FromStr for RecordType {
    type Err = InvalidRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            _ => Err(InvalidRecordType(s.to_string())),
        }
    }
}

/// Appends the root label if `name` does not already end in one.
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub qtype: RecordType,
}

impl Query {
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Query {
            name: fqdn(name),
            qtype,
        }
    }
}

/// A decoded resource record. Names are kept in absolute form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRecord {
    A {
        name: String,
        ttl: u32,
        addr: Ipv4Addr,
    },
    AAAA {
        name: String,
        ttl: u32,
        addr: Ipv6Addr,
    },
    NS {
        name: String,
        ttl: u32,
        host: String,
    },
    CNAME {
        name: String,
        ttl: u32,
        target: String,
    },
    SOA {
        name: String,
        ttl: u32,
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Unknown {
        name: String,
        ttl: u32,
        rtype: u16,
        data: Bytes,
    },
}

impl ResourceRecord {
    pub fn name(&self) -> &str {
        match self {
            ResourceRecord::A { name, .. }
            | ResourceRecord::AAAA { name, .. }
            | ResourceRecord::NS { name, .. }
            | ResourceRecord::CNAME { name, .. }
            | ResourceRecord::SOA { name, .. }
            | ResourceRecord::Unknown { name, .. } => name,
        }
    }

    pub fn ttl(&self) -> u32 {
        match self {
            ResourceRecord::A { ttl, .. }
            | ResourceRecord::AAAA { ttl, .. }
            | ResourceRecord::NS { ttl, .. }
            | ResourceRecord::CNAME { ttl, .. }
            | ResourceRecord::SOA { ttl, .. }
            | ResourceRecord::Unknown { ttl, .. } => *ttl,
        }
    }

    pub fn rtype(&self) -> RecordType {
        match self {
            ResourceRecord::A { .. } => RecordType::A,
            ResourceRecord::AAAA { .. } => RecordType::AAAA,
            ResourceRecord::NS { .. } => RecordType::NS,
            ResourceRecord::CNAME { .. } => RecordType::CNAME,
            ResourceRecord::SOA { .. } => RecordType::SOA,
            ResourceRecord::Unknown { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }
}

/// Zone file presentation form, tab separated.
impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\tIN\t{}\t", self.name(), self.ttl(), self.rtype())?;
        match self {
            ResourceRecord::A { addr, .. } => write!(f, "{addr}"),
            ResourceRecord::AAAA { addr, .. } => write!(f, "{addr}"),
            ResourceRecord::NS { host, .. } => f.write_str(host),
            ResourceRecord::CNAME { target, .. } => f.write_str(target),
            ResourceRecord::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ..
            } => write!(
                f,
                "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"
            ),
            // RFC 3597 generic encoding
            ResourceRecord::Unknown { data, .. } => {
                write!(f, "\\# {}", data.len())?;
                if !data.is_empty() {
                    f.write_str(" ")?;
                    for b in data.iter() {
                        write!(f, "{b:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub answer: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_parse() {
        assert_eq!("A".parse::<RecordType>(), Ok(RecordType::A));
        assert_eq!("AAAA".parse::<RecordType>(), Ok(RecordType::AAAA));
        assert_eq!("CNAME".parse::<RecordType>(), Ok(RecordType::CNAME));
        assert_eq!("SOA".parse::<RecordType>(), Ok(RecordType::SOA));

        let err = "MX".parse::<RecordType>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid record type: MX");
        assert!("NS".parse::<RecordType>().is_err());
        assert!("a".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_record_type_codes() {
        for t in [
            RecordType::A,
            RecordType::NS,
            RecordType::CNAME,
            RecordType::SOA,
            RecordType::AAAA,
        ] {
            assert_eq!(RecordType::from_u16(t.to_u16()), t);
        }
        assert_eq!(RecordType::from_u16(15), RecordType::Unknown(15));
        assert_eq!(RecordType::Unknown(15).to_string(), "TYPE15");
    }

    #[test]
    fn test_query_is_fully_qualified() {
        assert_eq!(Query::new("example.com", RecordType::A).name, "example.com.");
        assert_eq!(Query::new("example.com.", RecordType::A).name, "example.com.");
    }

    #[test]
    fn test_display() {
        let a = ResourceRecord::A {
            name: "example.com.".to_string(),
            ttl: 300,
            addr: Ipv4Addr::new(93, 184, 216, 34),
        };
        assert_eq!(a.to_string(), "example.com.\t300\tIN\tA\t93.184.216.34");

        let soa = ResourceRecord::SOA {
            name: "example.com.".to_string(),
            ttl: 3600,
            mname: "ns.icann.org.".to_string(),
            rname: "noc.dns.icann.org.".to_string(),
            serial: 2024081452,
            refresh: 7200,
            retry: 3600,
            expire: 1209600,
            minimum: 3600,
        };
        assert_eq!(
            soa.to_string(),
            "example.com.\t3600\tIN\tSOA\tns.icann.org. noc.dns.icann.org. 2024081452 7200 3600 1209600 3600"
        );

        let unknown = ResourceRecord::Unknown {
            name: "example.com.".to_string(),
            ttl: 60,
            rtype: 99,
            data: Bytes::from_static(&[0xde, 0xad]),
        };
        assert_eq!(unknown.to_string(), "example.com.\t60\tIN\tTYPE99\t\\# 2 dead");
    }
}
