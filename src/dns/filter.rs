//! Raw-packet query filter.
//!
//! Walks the layers of a captured frame by hand and decides whether it is
//! an unanswered DNS query worth handing to the decoder:
//!
//! 1. Link-layer frame: Ethernet (RFC 894) or Linux cooked capture (SLL)
//! 2. IPv4 (RFC 791) or IPv6 (RFC 8200) header, keeping the source address
//! 3. UDP (RFC 768) or TCP (RFC 9293) header with one side on port 53
//! 4. DNS message (RFC 1035) with the QR bit clear; the first question's
//!    name is extracted
//!
//! Captured traffic is noisy and frequently malformed, so nothing in here
//! errors: every packet that fails a check is dropped with `None`.

use bytes::Bytes;
use chrono::Local;
use log::debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::QueryEvent;

const DNS_PORT: u16 = 53;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

/// Link-layer framing of the capture handle, fixed per interface at open
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    /// DLT_EN10MB: 14-byte header, EtherType at bytes 12..14.
    Ethernet,
    /// DLT_LINUX_SLL, what the "any" pseudo-device delivers: 16-byte
    /// cooked header with the EtherType at bytes 14..16.
    LinuxSll,
}

/// Inspect one raw link-layer frame; return the query event if the frame
/// carries an unanswered DNS query over IPv4 or IPv6.
pub fn parse_query_packet(link: LinkLayer, data: &[u8]) -> Option<QueryEvent> {
    let header_len = match link {
        LinkLayer::Ethernet => 14,
        LinkLayer::LinuxSll => 16,
    };
    if data.len() < header_len {
        return None;
    }

    // Both framings carry the EtherType in the last two header bytes.
    let eth_type = u16::from_be_bytes([data[header_len - 2], data[header_len - 1]]);
    let mut offset = header_len;

    let (source, proto, ip_header_len) = match eth_type {
        ETHERTYPE_IPV4 => parse_ipv4(&data[offset..])?,
        ETHERTYPE_IPV6 => parse_ipv6(&data[offset..])?,
        _ => return None,
    };
    offset += ip_header_len;

    let dns = match proto {
        PROTO_UDP => strip_udp(&data[offset..])?,
        PROTO_TCP => strip_tcp(&data[offset..])?,
        _ => return None,
    };

    let qname = parse_dns_query(dns)?;
    debug!(
        "DNS query from {source}: {}",
        String::from_utf8_lossy(&qname)
    );

    Some(QueryEvent {
        qname,
        source,
        is_v6: source.is_ipv6(),
        received_at: Local::now(),
    })
}

/// IPv4 header (RFC 791): protocol at byte 9, source address at bytes
/// 12..16, header length from the IHL nibble in 32-bit words.
fn parse_ipv4(data: &[u8]) -> Option<(IpAddr, u8, usize)> {
    if data.len() < 20 {
        return None;
    }
    let proto = data[9];
    if proto != PROTO_UDP && proto != PROTO_TCP {
        return None;
    }
    let ihl = (data[0] & 0x0F) as usize * 4;
    if ihl < 20 || data.len() < ihl {
        return None;
    }
    let src: [u8; 4] = data[12..16].try_into().ok()?;
    Some((IpAddr::V4(Ipv4Addr::from(src)), proto, ihl))
}

/// IPv6 header (RFC 8200): fixed 40 bytes, next-header at byte 6, source
/// address at bytes 8..24. Extension header chains are not walked; a query
/// behind one is dropped like any other unrecognized framing.
fn parse_ipv6(data: &[u8]) -> Option<(IpAddr, u8, usize)> {
    if data.len() < 40 {
        return None;
    }
    let proto = data[6];
    if proto != PROTO_UDP && proto != PROTO_TCP {
        return None;
    }
    let src: [u8; 16] = data[8..24].try_into().ok()?;
    Some((IpAddr::V6(Ipv6Addr::from(src)), proto, 40))
}

/// UDP header (RFC 768): 8 bytes; source port at 0..2, destination port at
/// 2..4. One side must be the DNS port.
fn strip_udp(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 8 {
        return None;
    }
    let src_port = u16::from_be_bytes([data[0], data[1]]);
    let dst_port = u16::from_be_bytes([data[2], data[3]]);
    if src_port != DNS_PORT && dst_port != DNS_PORT {
        return None;
    }
    Some(&data[8..])
}

/// TCP header (RFC 9293): variable length from the data-offset nibble, then
/// a two-byte message length prefix before the DNS payload (RFC 1035
/// section 4.2.2). Only a message complete within this segment is accepted;
/// reassembly is out of scope.
fn strip_tcp(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 20 {
        return None;
    }
    let src_port = u16::from_be_bytes([data[0], data[1]]);
    let dst_port = u16::from_be_bytes([data[2], data[3]]);
    if src_port != DNS_PORT && dst_port != DNS_PORT {
        return None;
    }
    let header_len = ((data[12] >> 4) as usize) * 4;
    if header_len < 20 || data.len() < header_len + 2 {
        return None;
    }
    let payload = &data[header_len..];
    let msg_len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    if payload.len() < 2 + msg_len {
        return None;
    }
    Some(&payload[2..2 + msg_len])
}

/// DNS message (RFC 1035 section 4.1): 12-byte header, then the question
/// section. Accepts queries only (QR bit clear) with at least one question
/// and extracts the first question's name.
fn parse_dns_query(data: &[u8]) -> Option<Bytes> {
    if data.len() < 12 {
        return None;
    }

    let flags = u16::from_be_bytes([data[2], data[3]]);
    let is_response = (flags & 0x8000) != 0;
    let qd_count = u16::from_be_bytes([data[4], data[5]]);
    if is_response || qd_count == 0 {
        return None;
    }

    let mut offset = 12;
    parse_qname(data, &mut offset)
}

/// Decode a wire-format domain name into dotted labels with a trailing
/// root dot (RFC 1035 section 3.1), following compression pointers
/// (section 4.1.4) with a jump cap against pointer loops.
fn parse_qname(data: &[u8], offset: &mut usize) -> Option<Bytes> {
    let mut name = Vec::new();
    let max_jumps = 10;
    let mut jump_count = 0;

    loop {
        if *offset >= data.len() {
            return None;
        }

        let len = data[*offset] as usize;
        if len == 0 {
            break;
        }

        // Top two bits set marks a compression pointer.
        if (len & 0xC0) == 0xC0 {
            if *offset + 1 >= data.len() {
                return None;
            }
            jump_count += 1;
            if jump_count > max_jumps {
                return None;
            }
            let pointer = ((len & 0x3F) << 8) | data[*offset + 1] as usize;
            *offset = pointer;
            continue;
        }

        // Labels are capped at 63 octets (RFC 1035 section 2.3.4).
        if len > 63 {
            return None;
        }
        *offset += 1;
        if *offset + len > data.len() {
            return None;
        }
        name.extend_from_slice(&data[*offset..*offset + len]);
        name.push(b'.');
        *offset += len;

        // Whole names are capped at 255 octets.
        if name.len() > 255 {
            return None;
        }
    }

    if name.is_empty() {
        return None;
    }
    Some(Bytes::from(name))
}
