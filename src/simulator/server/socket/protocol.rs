use std::io::{Error, ErrorKind, Read, Result, Write};

// Socket configuration
pub const SOCKET_CMD_PORT: u16 = 6000;
pub const SOCKET_HOST: &str = "127.0.0.1";

// Message types
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MsgType {
  CmdReq = 0,
  CmdResp = 1,
}

// Response status, carried in the header's reserved word
pub const STATUS_OK: u32 = 0;
pub const STATUS_PROTOCOL_VIOLATION: u32 = 1;
pub const STATUS_MALFORMED: u32 = 2;

// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
  pub msg_type: u32,
  pub reserved: u32,
}

// Command request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdReq {
  pub header: MsgHeader,
  pub funct: u32,
  pub padding: u32,
  pub xs1: u64,
  pub xs2: u64,
}

// Command response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdResp {
  pub header: MsgHeader,
  pub result: u64,
}

/// Fixed-size little-endian wire frame.
pub trait Frame: Sized {
  const SIZE: usize;

  fn encode(&self, buf: &mut Vec<u8>);
  fn decode(buf: &[u8]) -> Self;
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
  let mut word = [0u8; 4];
  word.copy_from_slice(&buf[at..at + 4]);
  u32::from_le_bytes(word)
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
  let mut word = [0u8; 8];
  word.copy_from_slice(&buf[at..at + 8]);
  u64::from_le_bytes(word)
}

impl Frame for MsgHeader {
  const SIZE: usize = 8;

  fn encode(&self, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&self.msg_type.to_le_bytes());
    buf.extend_from_slice(&self.reserved.to_le_bytes());
  }

  fn decode(buf: &[u8]) -> Self {
    Self {
      msg_type: u32_at(buf, 0),
      reserved: u32_at(buf, 4),
    }
  }
}

impl Frame for CmdReq {
  const SIZE: usize = 32;

  fn encode(&self, buf: &mut Vec<u8>) {
    self.header.encode(buf);
    buf.extend_from_slice(&self.funct.to_le_bytes());
    buf.extend_from_slice(&self.padding.to_le_bytes());
    buf.extend_from_slice(&self.xs1.to_le_bytes());
    buf.extend_from_slice(&self.xs2.to_le_bytes());
  }

  fn decode(buf: &[u8]) -> Self {
    Self {
      header: MsgHeader::decode(buf),
      funct: u32_at(buf, 8),
      padding: u32_at(buf, 12),
      xs1: u64_at(buf, 16),
      xs2: u64_at(buf, 24),
    }
  }
}

impl Frame for CmdResp {
  const SIZE: usize = 16;

  fn encode(&self, buf: &mut Vec<u8>) {
    self.header.encode(buf);
    buf.extend_from_slice(&self.result.to_le_bytes());
  }

  fn decode(buf: &[u8]) -> Self {
    Self {
      header: MsgHeader::decode(buf),
      result: u64_at(buf, 8),
    }
  }
}

impl CmdReq {
  pub fn new(funct: u32, xs1: u64, xs2: u64) -> Self {
    Self {
      header: MsgHeader {
        msg_type: MsgType::CmdReq as u32,
        reserved: 0,
      },
      funct,
      padding: 0,
      xs1,
      xs2,
    }
  }
}

impl CmdResp {
  pub fn new(status: u32, result: u64) -> Self {
    Self {
      header: MsgHeader {
        msg_type: MsgType::CmdResp as u32,
        reserved: status,
      },
      result,
    }
  }

  pub fn status(&self) -> u32 {
    self.header.reserved
  }
}

// Helper functions for reading/writing frames
pub fn read_struct<T: Frame, R: Read>(stream: &mut R) -> Result<T> {
  let mut buf = vec![0u8; T::SIZE];
  stream.read_exact(&mut buf)?;
  Ok(T::decode(&buf))
}

pub fn write_struct<T: Frame, W: Write>(stream: &mut W, data: &T) -> Result<()> {
  let mut buf = Vec::with_capacity(T::SIZE);
  data.encode(&mut buf);
  stream.write_all(&buf)?;
  stream.flush()
}

pub fn expect_type(header: &MsgHeader, expected: MsgType) -> Result<()> {
  if header.msg_type != expected as u32 {
    return Err(Error::new(
      ErrorKind::InvalidData,
      format!("expected {:?}, got msg_type {}", expected, header.msg_type),
    ));
  }
  Ok(())
}
