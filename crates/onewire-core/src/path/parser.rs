use super::{Extension, Namespace, ParsedName, RomId, StateFlags};
use crate::device;
use crate::error::{CoreError, CoreResult};

/// Parses an absolute path into a [`ParsedName`].
///
/// This function performs no I/O: an unknown-but-well-formed family code on
/// a real path is not an error here, only later when the router tries (and
/// fails) to find the device on any bus.
pub fn parse(path: &str) -> CoreResult<ParsedName> {
    let canonical = path.to_string();
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut state = StateFlags::default();
    let mut adapter = None;

    // `/bus.N/...` restricts the search to one inbound bus.
    if let Some(first) = segments.first() {
        if let Some(n) = first.strip_prefix("bus.").or_else(|| first.strip_prefix("BUS.")) {
            let bus_nr: u32 = n.parse().map_err(|_| CoreError::BadFormat(canonical.clone()))?;
            adapter = Some(bus_nr);
            segments.remove(0);
        }
    }

    // `alarm` and `uncached` are flags, not namespaces; they may appear
    // anywhere before the device segment and are stripped once consumed.
    loop {
        match segments.first().copied() {
            Some("alarm") => {
                state.alarm = true;
                segments.remove(0);
            }
            Some("uncached") => {
                state.uncached = true;
                segments.remove(0);
            }
            _ => break,
        }
    }

    let namespace = match segments.first().copied() {
        Some("system") => {
            segments.remove(0);
            Namespace::System
        }
        Some("statistics") => {
            segments.remove(0);
            Namespace::Statistics
        }
        Some("settings") => {
            segments.remove(0);
            Namespace::Settings
        }
        Some("structure") => {
            segments.remove(0);
            Namespace::Structure
        }
        _ => Namespace::Real,
    };

    if namespace != Namespace::Real {
        return Ok(ParsedName {
            path: canonical,
            namespace,
            adapter,
            device: None,
            rom: None,
            filetype: None,
            extension: Extension::None,
            bus_nr: None,
            state,
            segments: segments.into_iter().map(str::to_string).collect(),
        });
    }

    // Root, or a bus-only path: enumerate adapters/namespaces, no device.
    let Some(device_segment) = segments.first().copied() else {
        return Ok(ParsedName {
            path: canonical,
            namespace,
            adapter,
            device: None,
            rom: None,
            filetype: None,
            extension: Extension::None,
            bus_nr: None,
            state,
            segments: Vec::new(),
        });
    };

    let (dev, rom) = if device_segment.eq_ignore_ascii_case("simultaneous") {
        let dev = device::lookup_pseudo("simultaneous")
            .ok_or_else(|| CoreError::NotFound(canonical.clone()))?;
        (dev, None)
    } else {
        let rom = parse_rom_id(device_segment, state.uncached)?;
        let dev = device::lookup_family(rom.family());
        match dev {
            Some(d) => (d, Some(rom)),
            // Unknown-but-well-formed family: not an error at parse time.
            None => {
                return Ok(ParsedName {
                    path: canonical,
                    namespace,
                    adapter,
                    device: None,
                    rom: Some(rom),
                    filetype: None,
                    extension: Extension::None,
                    bus_nr: None,
                    state,
                    segments: Vec::new(),
                });
            }
        }
    };

    let mut filetype = None;
    let mut extension = Extension::None;

    if let Some(prop_segment) = segments.get(1) {
        let (name, ext) = match prop_segment.split_once('.') {
            Some((n, e)) => (n, Some(e)),
            None => (prop_segment.as_ref(), None),
        };

        filetype = dev.find_filetype(name);
        let Some(ft) = filetype else {
            return Err(CoreError::NotFound(canonical));
        };

        extension = match ext {
            None => Extension::None,
            Some(e) if e.eq_ignore_ascii_case("all") => Extension::All,
            Some(e) if e.eq_ignore_ascii_case("byte") => {
                if !ft.is_bitfield() {
                    return Err(CoreError::BadFormat(canonical));
                }
                Extension::Byte
            }
            Some(e) => match e.parse::<u32>() {
                Ok(n) => {
                    let n = u8::try_from(n).map_err(|_| CoreError::BadFormat(canonical.clone()))?;
                    Extension::Index(n)
                }
                Err(_) if e.len() == 1 && e.as_bytes()[0].is_ascii_lowercase() => {
                    Extension::Index(e.as_bytes()[0] - b'a')
                }
                Err(_) => return Err(CoreError::BadFormat(canonical)),
            },
        };

        if let Some(agg) = ft.aggregate {
            if let Extension::Index(i) = extension {
                if u32::from(i) >= agg.count {
                    return Err(CoreError::BadFormat(canonical));
                }
            }
        }
    }

    Ok(ParsedName {
        path: canonical,
        namespace,
        adapter,
        device: Some(dev),
        rom,
        filetype,
        extension,
        bus_nr: None,
        state,
        segments: Vec::new(),
    })
}

/// Parses `FF.SSSSSSSSSS` into a validated [`RomId`]: two hex digits,
/// `.`, ten hex digits with the CRC-8 as the last byte — matching the
/// ten-hex-digit form [`RomId::to_canonical_string`] renders.
fn parse_rom_id(segment: &str, uncached: bool) -> CoreResult<RomId> {
    let (family_hex, rest) = segment
        .split_once('.')
        .ok_or_else(|| CoreError::NotFound(segment.to_string()))?;

    if family_hex.len() != 2 || rest.len() != 10 || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::BadFormat(segment.to_string()));
    }

    let family = u8::from_str_radix(family_hex, 16).map_err(|_| CoreError::BadFormat(segment.to_string()))?;

    let mut bytes = [0u8; 6];
    bytes[0] = family;
    for i in 0..5 {
        bytes[i + 1] = u8::from_str_radix(&rest[2 * i..2 * i + 2], 16)
            .map_err(|_| CoreError::BadFormat(segment.to_string()))?;
    }

    let rom = RomId(bytes);
    if !uncached && !rom.crc_is_valid() {
        return Err(CoreError::BadFormat(segment.to_string()));
    }
    Ok(rom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Namespace;

    #[test]
    fn root_path_has_no_device() {
        let pn = parse("/").unwrap();
        assert_eq!(pn.namespace, Namespace::Real);
        assert!(pn.device.is_none());
    }

    #[test]
    fn bad_hex_is_bad_format() {
        let err = parse("/ZZ.0000000000").unwrap_err();
        assert!(matches!(err, CoreError::BadFormat(_)));
    }

    #[test]
    fn unknown_but_well_formed_family_is_not_a_parse_error() {
        // 7F is not a registered family, but the ROM id is syntactically
        // valid once the CRC matches.
        let serial = [0x7Fu8, 0x01, 0x02, 0x03, 0x04, 0x05];
        let crc = crate::crc::crc8(&serial[..5]);
        let text = format!(
            "/{:02X}.{:02X}{:02X}{:02X}{:02X}{:02X}",
            serial[0], serial[1], serial[2], serial[3], serial[4], crc
        );
        let pn = parse(&text).unwrap();
        assert!(pn.device.is_none());
        assert!(pn.rom.is_some());
    }

    #[test]
    fn uncached_flag_is_consumed_and_skips_crc() {
        let pn = parse("/uncached/28.0000000000").unwrap();
        assert!(pn.state.uncached);
    }

    #[test]
    fn rom_id_survives_a_canonical_string_round_trip() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, crate::crc::crc8(&[0x2C, 0x01, 0x02, 0x03, 0x04])]);
        let text = format!("/{}/wiper", rom.to_canonical_string());
        let pn = parse(&text).unwrap();
        assert_eq!(pn.rom, Some(rom));
    }

    #[test]
    fn bus_restriction_is_parsed_and_stripped() {
        let pn = parse("/bus.1/system").unwrap();
        assert_eq!(pn.adapter, Some(1));
        assert_eq!(pn.namespace, Namespace::System);
    }
}
