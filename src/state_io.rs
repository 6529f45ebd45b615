// ============================================================================
// state_io.rs — flockd
// Binary flock state save/load, so a headless run can resume from (or hand
// off) an exact pair of position/velocity fields.
// ============================================================================

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::Vec4;

const MAGIC: &[u8; 8] = b"FLOCKS01";

/// Both fields in full, `w` included.
#[derive(Clone, Debug, PartialEq)]
pub struct FlockState {
    pub positions: Vec<Vec4>,
    pub velocities: Vec<Vec4>,
}

pub fn save_state(path: impl AsRef<Path>, state: &FlockState) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(MAGIC)?;
    file.write_all(&(state.positions.len() as u32).to_le_bytes())?;

    write_vec4s(&mut file, &state.positions)?;
    write_vec4s(&mut file, &state.velocities)?;
    file.flush()
}

/// Load a state file holding exactly `agent_count` agents.
pub fn load_state(path: impl AsRef<Path>, agent_count: usize) -> io::Result<FlockState> {
    let mut file = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid flock state magic"));
    }

    let count = read_u32(&mut file)? as usize;
    if count != agent_count {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("state holds {count} agents, flock has {agent_count}"),
        ));
    }

    let positions = read_vec4s(&mut file, count)?;
    let velocities = read_vec4s(&mut file, count)?;
    Ok(FlockState { positions, velocities })
}

fn write_vec4s(file: &mut impl Write, values: &[Vec4]) -> io::Result<()> {
    for value in values {
        for component in value.to_array() {
            file.write_all(&component.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_vec4s(file: &mut impl Read, count: usize) -> io::Result<Vec<Vec4>> {
    let mut bytes = vec![0u8; count * 16];
    file.read_exact(&mut bytes)?;
    let mut values = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(16) {
        let f = |i: usize| f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);
        values.push(Vec4::new(f(0), f(4), f(8), f(12)));
    }
    Ok(values)
}

fn read_u32(file: &mut impl Read) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    file.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("flockd_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("state.bin");
        let state = FlockState {
            positions: vec![Vec4::new(1.0, -2.0, 3.5, 1.0), Vec4::new(0.0, 0.0, -400.0, 1.0)],
            velocities: vec![Vec4::new(0.25, 0.0, 0.0, 1.0), Vec4::ZERO],
        };
        save_state(&path, &state).unwrap();
        assert_eq!(load_state(&path, 2).unwrap(), state);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_other_population() {
        let path = temp_path("small.bin");
        let state = FlockState {
            positions: vec![Vec4::ZERO; 4],
            velocities: vec![Vec4::ZERO; 4],
        };
        save_state(&path, &state).unwrap();
        let err = load_state(&path, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let path = temp_path("garbage.bin");
        std::fs::write(&path, b"NOTFLOCK\x00\x00\x00\x00").unwrap();
        assert!(load_state(&path, 0).is_err());
        std::fs::remove_file(&path).ok();
    }
}
