/*
                                1  1  1  1  1  1
  0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      ID                       |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    QDCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ANCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    NSCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ARCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
 */

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};
use nom::{
    bits::complete::take as take_bits,
    bytes::complete::take,
    combinator::{all_consuming, map},
    error::{Error as NomError, ErrorKind},
    multi::{length_data, many_m_n},
    number::complete::{be_u128, be_u16, be_u32, be_u8},
    sequence::tuple,
};
use thiserror::Error;

use crate::dns_record::{Query, RecordType, ResourceRecord, Response};

const DNS_HDR_SIZE: usize = 12;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
// bounds compression pointer chains, which may otherwise loop
const MAX_POINTER_JUMPS: usize = 64;

const OPCODE_QUERY: u8 = 0;
const CLASS_IN: u16 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty label in {0}")]
    EmptyLabel(String),
    #[error("label longer than 63 bytes in {0}")]
    LabelTooLong(String),
    #[error("name longer than 255 bytes: {0}")]
    NameTooLong(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    pub qr: u8,
    pub opcode: u8,
    pub aa: u8,
    pub tc: u8,
    pub rd: u8,
    pub ra: u8,
    pub rcode: u8,
}

impl Flags {
    pub fn compress_u16(&self) -> u16 {
        let flags_h: u8 =
            (self.qr << 7) | (self.opcode << 3) | (self.aa << 2) | (self.tc << 1) | self.rd;
        let flags_l: u8 = (self.ra << 7) | (self.rcode);

        (flags_h as u16) << 8 | (flags_l as u16)
    }

    fn parse_flags(input: (&[u8], usize)) -> nom::IResult<(&[u8], usize), Flags> {
        map(
            tuple((
                take_bits(1u8),
                take_bits(4u8),
                take_bits(1u8),
                take_bits(1u8),
                take_bits(1u8),
                take_bits(1u8),
                take_bits(3u8),
                take_bits(4u8),
            )),
            |(qr, opcode, aa, tc, rd, ra, _, rcode): (u8, u8, u8, u8, u8, u8, u8, u8)| Flags {
                qr,
                opcode,
                aa,
                tc,
                rd,
                ra,
                rcode,
            },
        )(input)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DNSHdr {
    pub id: u16,
    pub flags: Flags,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DNSHdr {
    /// Header for a single-question iterative query (RD clear).
    pub fn query(id: u16) -> Self {
        DNSHdr {
            id,
            flags: Flags {
                opcode: OPCODE_QUERY,
                ..Flags::default()
            },
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags.compress_u16());
        buf.put_u16(self.qdcount);
        buf.put_u16(self.ancount);
        buf.put_u16(self.nscount);
        buf.put_u16(self.arcount);
    }

    pub fn from_bytes(buf: &[u8]) -> nom::IResult<&[u8], Self> {
        map(
            tuple((
                be_u16,
                nom::bits::bits(Flags::parse_flags),
                be_u16,
                be_u16,
                be_u16,
                be_u16,
            )),
            |(id, flags, qdcount, ancount, nscount, arcount)| DNSHdr {
                id,
                flags,
                qdcount,
                ancount,
                nscount,
                arcount,
            },
        )(buf)
    }
}

/// A decoded response: its header plus the three record sections.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: DNSHdr,
    pub response: Response,
}

/*
1  1  1  1  1  1
0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                                               |
/                     QNAME                     /
/                                               /
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     QTYPE                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     QCLASS                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
*/
pub fn encode_query(id: u16, query: &Query) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(DNS_HDR_SIZE + query.name.len() + 6);

    DNSHdr::query(id).to_bytes(&mut buf);
    encode_name(&query.name, &mut buf)?;
    buf.put_u16(query.qtype.to_u16());
    buf.put_u16(CLASS_IN);

    Ok(buf.freeze())
}

fn encode_name(name: &str, buf: &mut BytesMut) -> Result<(), WireError> {
    let start = buf.len();
    let relative = name.strip_suffix('.').unwrap_or(name);

    if !relative.is_empty() {
        for label in relative.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel(name.to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong(name.to_string()));
            }
            buf.put_u8(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.put_u8(0);

    if buf.len() - start > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(name.to_string()));
    }
    Ok(())
}

fn failure(input: &[u8]) -> nom::Err<NomError<&[u8]>> {
    nom::Err::Failure(NomError::new(input, ErrorKind::Verify))
}

/// Reads a possibly compressed name starting at `input`. Pointers are
/// resolved against the whole message `msg`.
fn parse_name<'a>(msg: &'a [u8], input: &'a [u8]) -> nom::IResult<&'a [u8], String> {
    let mut labels: Vec<String> = Vec::new();
    let mut rest = input;
    let mut resume: Option<&'a [u8]> = None;
    let mut jumps = 0;
    let mut wire_len = 1;

    loop {
        let (r, len) = be_u8(rest)?;
        match len & 0b1100_0000 {
            0b1100_0000 => {
                let (r, low) = be_u8(r)?;
                jumps += 1;
                let offset = (((len & 0b0011_1111) as usize) << 8) | low as usize;
                if jumps > MAX_POINTER_JUMPS || offset >= msg.len() {
                    return Err(failure(input));
                }
                resume.get_or_insert(r);
                rest = &msg[offset..];
            }
            0 if len == 0 => {
                rest = r;
                break;
            }
            0 => {
                let (r, label) = take(len as usize)(r)?;
                wire_len += label.len() + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(failure(input));
                }
                // a label must survive being written back out by encode_name
                match std::str::from_utf8(label) {
                    Ok(text) if !text.contains('.') => labels.push(text.to_string()),
                    _ => return Err(failure(input)),
                }
                rest = r;
            }
            // 0b01 and 0b10 label types are reserved
            _ => return Err(failure(input)),
        }
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        format!("{}.", labels.join("."))
    };
    Ok((resume.unwrap_or(rest), name))
}

/// A name that must fill the remainder of `rdata`.
fn rdata_name<'a>(msg: &'a [u8], rdata: &'a [u8]) -> nom::IResult<&'a [u8], String> {
    let (rest, name) = parse_name(msg, rdata)?;
    if !rest.is_empty() {
        return Err(failure(rest));
    }
    Ok((rest, name))
}

/*
0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                                               |
/                                               /
/                      NAME                     /
|                                               |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      TYPE                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     CLASS                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      TTL                      |
|                                               |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                   RDLENGTH                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
/                     RDATA                     /
/                                               /
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
*/
fn parse_record<'a>(msg: &'a [u8], input: &'a [u8]) -> nom::IResult<&'a [u8], ResourceRecord> {
    let (rest, name) = parse_name(msg, input)?;
    let (rest, (rtype, _class, ttl, rdata)) =
        tuple((be_u16, be_u16, be_u32, length_data(be_u16)))(rest)?;

    let record = match RecordType::from_u16(rtype) {
        RecordType::A => {
            let (_, addr) = all_consuming(be_u32)(rdata)?;
            ResourceRecord::A {
                name,
                ttl,
                addr: Ipv4Addr::from(addr),
            }
        }
        RecordType::AAAA => {
            let (_, addr) = all_consuming(be_u128)(rdata)?;
            ResourceRecord::AAAA {
                name,
                ttl,
                addr: Ipv6Addr::from(addr),
            }
        }
        RecordType::NS => {
            let (_, host) = rdata_name(msg, rdata)?;
            ResourceRecord::NS { name, ttl, host }
        }
        RecordType::CNAME => {
            let (_, target) = rdata_name(msg, rdata)?;
            ResourceRecord::CNAME { name, ttl, target }
        }
        RecordType::SOA => {
            let (r, mname) = parse_name(msg, rdata)?;
            let (r, rname) = parse_name(msg, r)?;
            let (_, (serial, refresh, retry, expire, minimum)) =
                all_consuming(tuple((be_u32, be_u32, be_u32, be_u32, be_u32)))(r)?;
            ResourceRecord::SOA {
                name,
                ttl,
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            }
        }
        RecordType::Unknown(rtype) => ResourceRecord::Unknown {
            name,
            ttl,
            rtype,
            data: Bytes::copy_from_slice(rdata),
        },
    };

    Ok((rest, record))
}

fn parse_records<'a>(
    msg: &'a [u8],
    input: &'a [u8],
    n: usize,
) -> nom::IResult<&'a [u8], Vec<ResourceRecord>> {
    many_m_n(n, n, |i| parse_record(msg, i))(input)
}

fn parse_message(msg: &[u8]) -> nom::IResult<&[u8], Message> {
    let (rest, header) = DNSHdr::from_bytes(msg)?;

    let qdcount = header.qdcount as usize;
    let (rest, _questions) = many_m_n(
        qdcount,
        qdcount,
        tuple((|i| parse_name(msg, i), be_u16, be_u16)),
    )(rest)?;

    let (rest, answer) = parse_records(msg, rest, header.ancount as usize)?;
    let (rest, authority) = parse_records(msg, rest, header.nscount as usize)?;
    let (rest, additional) = parse_records(msg, rest, header.arcount as usize)?;

    Ok((
        rest,
        Message {
            header,
            response: Response {
                answer,
                authority,
                additional,
            },
        },
    ))
}

pub fn decode_message(buf: &[u8]) -> Result<Message, WireError> {
    match parse_message(buf) {
        Ok((_, message)) => Ok(message),
        Err(nom::Err::Incomplete(_)) => Err(WireError::Malformed("truncated".to_string())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = buf.len().saturating_sub(e.input.len());
            Err(WireError::Malformed(format!(
                "{:?} near byte {offset}",
                e.code
            )))
        }
    }
}
