use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        cube::{connect_to_parents, Cube, CubeCore},
        view::ChunkId,
    },
    errors::{CubeError, Result},
};

/// Pipes each chunk through an external command as a framed binary payload
/// and reads a chunk of the same shape back.
///
/// Frame layout, little endian: four `u32` for `[bands, t, y, x]` followed
/// by the `f64` payload in band-major order. The response uses the same
/// framing and must preserve the shape.
pub struct StreamCube {
    core: CubeCore,
    command: String,
}

impl StreamCube {
    pub fn create(in_cube: Arc<dyn Cube>, command: impl Into<String>) -> Result<Arc<Self>> {
        let core = CubeCore::new(
            in_cube.st_ref().clone(),
            in_cube.bands().clone(),
            in_cube.chunk_size(),
            vec![in_cube],
        );
        let out = Arc::new(Self {
            core,
            command: command.into(),
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

fn encode(chunk: &ChunkBuffer) -> Vec<u8> {
    let shape = chunk.shape();
    let mut payload = Vec::with_capacity(16 + chunk.len() * 8);
    for extent in shape {
        payload.extend_from_slice(&(extent as u32).to_le_bytes());
    }
    for value in chunk.as_slice() {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload
}

fn decode(payload: &[u8], expected: [usize; 4]) -> Result<ChunkBuffer> {
    if payload.len() < 16 {
        return Err(CubeError::StreamFailed(format!(
            "response of {} bytes is too short for a frame header",
            payload.len()
        )));
    }
    let mut shape = [0usize; 4];
    for (axis, raw) in payload[..16].chunks_exact(4).enumerate() {
        shape[axis] = u32::from_le_bytes(raw.try_into().expect("4 bytes")) as usize;
    }
    if shape != expected {
        return Err(CubeError::StreamShapeMismatch {
            got: shape,
            expected,
        });
    }
    let values: usize = shape.iter().product();
    let body = &payload[16..];
    if body.len() != values * 8 {
        return Err(CubeError::StreamFailed(format!(
            "expected {} payload bytes, got {}",
            values * 8,
            body.len()
        )));
    }
    let mut out = ChunkBuffer::new(shape);
    for (value, raw) in out.as_mut_slice().iter_mut().zip(body.chunks_exact(8)) {
        *value = f64::from_le_bytes(raw.try_into().expect("8 bytes"));
    }
    Ok(out)
}

impl Cube for StreamCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("stream_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        let chunk = self.parents()[0].read_chunk(id)?;
        if chunk.is_empty() {
            return Ok(ChunkBuffer::empty());
        }
        let expected = chunk.shape();
        let payload = encode(&chunk);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CubeError::StreamFailed(format!("`{}`: {e}", self.command)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CubeError::StreamFailed(String::from("no stdin handle")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CubeError::StreamFailed(String::from("no stdout handle")))?;

        // write and read concurrently so neither pipe fills up
        let response = std::thread::scope(|scope| -> Result<Vec<u8>> {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                match stdin.write_all(&payload) {
                    // a command may legitimately close stdin early
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            });
            let mut response = Vec::new();
            stdout.read_to_end(&mut response)?;
            writer
                .join()
                .map_err(|_| CubeError::StreamFailed(String::from("writer thread panicked")))??;
            Ok(response)
        })?;

        let status = child.wait()?;
        if !status.success() {
            let mut message = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut message);
            }
            return Err(CubeError::StreamFailed(format!(
                "`{}` exited with {status}: {}",
                self.command,
                message.trim()
            )));
        }
        decode(&response, expected)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "stream",
            "command": self.command,
            "in_cube": self.parents()[0].describe(),
        })
    }
}
