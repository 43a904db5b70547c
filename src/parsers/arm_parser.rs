use super::FieldReader;
use crate::answers::{ArmInfo, ArmJointCalibration, ArmStatus, P2OS_ARM_JOINTS};
use crate::base::Result;

/// Parses an `ARMPAC` payload (type byte excluded).
pub fn parse_arm_status(data: &[u8]) -> Result<ArmStatus> {
    let mut reader = FieldReader::new("ARMPAC", data);
    Ok(ArmStatus {
        status: reader.u8()?,
        motion: reader.u8()?,
        joint_ticks: reader.bytes::<P2OS_ARM_JOINTS>()?,
    })
}

/// Parses an `ARMINFOPAC` payload (type byte excluded).
pub fn parse_arm_info(data: &[u8]) -> Result<ArmInfo> {
    let mut reader = FieldReader::new("ARMINFOPAC", data);
    let version = reader.c_string();
    let joint_count = reader.u8()?;
    let mut joints = Vec::with_capacity(joint_count as usize);
    for _ in 0..joint_count {
        let [speed, home, min, centre, max, ticks_per_90] = reader.bytes::<6>()?;
        joints.push(ArmJointCalibration {
            speed,
            home,
            min,
            centre,
            max,
            ticks_per_90,
        });
    }
    Ok(ArmInfo { version, joints })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arm_status() {
        let status = parse_arm_status(&[0x03, 0x05, 10, 20, 30, 40, 50, 60]).unwrap();
        assert_eq!(status.status, 0x03);
        assert_eq!(status.motion, 0x05);
        assert_eq!(status.joint_ticks, [10, 20, 30, 40, 50, 60]);
        assert!(parse_arm_status(&[0x03, 0x05, 10]).is_err());
    }

    #[test]
    fn parses_arm_info() {
        let mut data = b"P2 Arm 1.0\0".to_vec();
        data.push(2);
        data.extend_from_slice(&[20, 128, 0, 100, 200, 90]);
        data.extend_from_slice(&[30, 128, 10, 120, 250, 80]);

        let info = parse_arm_info(&data).unwrap();
        assert_eq!(info.version, "P2 Arm 1.0");
        assert!(info.has_arm());
        assert_eq!(info.joints.len(), 2);
        assert_eq!(
            info.joints[1],
            ArmJointCalibration {
                speed: 30,
                home: 128,
                min: 10,
                centre: 120,
                max: 250,
                ticks_per_90: 80
            }
        );
    }

    #[test]
    fn no_arm_version_reports_no_arm() {
        let mut data = b"No arm\0".to_vec();
        data.push(0);
        let info = parse_arm_info(&data).unwrap();
        assert!(!info.has_arm());
        assert!(info.joints.is_empty());
    }
}
