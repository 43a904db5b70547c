use super::FieldReader;
use crate::answers::StandardSip;
use crate::base::Result;
use log::trace;

/// Parses the payload of a standard status packet (type byte excluded).
pub fn parse_standard_sip(data: &[u8]) -> Result<StandardSip> {
    let mut reader = FieldReader::new("SIP", data);

    let xpos = reader.u16()?;
    let ypos = reader.u16()?;
    let angle = reader.i16()?;
    let left_velocity = reader.i16()?;
    let right_velocity = reader.i16()?;
    let battery = reader.u8()?;
    let left_stall_bumpers = reader.u8()?;
    let right_stall_bumpers = reader.u8()?;
    let control = reader.i16()?;
    let flags = reader.u16()?;
    let compass = reader.u8()?;

    let sonar_count = reader.u8()?;
    let mut sonars = Vec::with_capacity(sonar_count as usize);
    for _ in 0..sonar_count {
        let index = reader.u8()?;
        let range = reader.u16()?;
        sonars.push((index, range));
    }

    let timer = reader.u16()?;
    let analog = reader.u8()?;
    let digin = reader.u8()?;
    let digout = reader.u8()?;

    trace!(
        "SIP: pos=({}, {}) angle={} vel=({}, {}) battery={} sonars={}",
        xpos,
        ypos,
        angle,
        left_velocity,
        right_velocity,
        battery,
        sonars.len()
    );

    Ok(StandardSip {
        xpos,
        ypos,
        angle,
        left_velocity,
        right_velocity,
        battery,
        left_stall_bumpers,
        right_stall_bumpers,
        control,
        flags,
        compass,
        sonars,
        timer,
        analog,
        digin,
        digout,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a SIP payload (type byte excluded) from its fields.
    pub(crate) fn sip_payload(sip: &StandardSip) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&sip.xpos.to_le_bytes());
        out.extend_from_slice(&sip.ypos.to_le_bytes());
        out.extend_from_slice(&sip.angle.to_le_bytes());
        out.extend_from_slice(&sip.left_velocity.to_le_bytes());
        out.extend_from_slice(&sip.right_velocity.to_le_bytes());
        out.push(sip.battery);
        out.push(sip.left_stall_bumpers);
        out.push(sip.right_stall_bumpers);
        out.extend_from_slice(&sip.control.to_le_bytes());
        out.extend_from_slice(&sip.flags.to_le_bytes());
        out.push(sip.compass);
        out.push(sip.sonars.len() as u8);
        for (index, range) in &sip.sonars {
            out.push(*index);
            out.extend_from_slice(&range.to_le_bytes());
        }
        out.extend_from_slice(&sip.timer.to_le_bytes());
        out.push(sip.analog);
        out.push(sip.digin);
        out.push(sip.digout);
        out
    }

    #[test]
    fn parses_every_field() {
        let sip = StandardSip {
            xpos: 4095,
            ypos: 12,
            angle: -1024,
            left_velocity: -300,
            right_velocity: 300,
            battery: 128,
            left_stall_bumpers: 0x03,
            right_stall_bumpers: 0x00,
            control: 7,
            flags: 0x0001,
            compass: 90,
            sonars: vec![(0, 1500), (7, 3000)],
            timer: 0x0011,
            analog: 255,
            digin: 0x0C,
            digout: 0x80,
        };
        assert_eq!(parse_standard_sip(&sip_payload(&sip)).unwrap(), sip);
    }

    #[test]
    fn rejects_truncated_sonar_list() {
        let mut payload = sip_payload(&StandardSip {
            sonars: vec![(0, 1500)],
            ..Default::default()
        });
        // claim a second reading that is not there
        payload[18] = 2;
        assert!(parse_standard_sip(&payload).is_err());
    }
}
