use super::protocol::*;
use crate::arch::cfu::{Accelerator, Command};
use crate::error::{protocol_violation, ConvError, Result};
use std::io::{self, ErrorKind};
use std::net::TcpStream;

/// Remote CFU reached over the command socket.
pub struct CfuClient {
  cmd_stream: TcpStream,
}

impl CfuClient {
  pub fn connect(host: &str, port: u16) -> io::Result<Self> {
    let cmd_stream = TcpStream::connect((host, port)).map_err(|e| {
      io::Error::new(
        ErrorKind::ConnectionRefused,
        format!("failed to connect to CFU server {}:{}: {}", host, port, e),
      )
    })?;
    cmd_stream.set_nodelay(true)?;
    log::info!("connected to CFU server {}:{}", host, port);
    Ok(Self { cmd_stream })
  }

  // Send CMD request and receive response
  pub fn send_cmd(&mut self, funct: u32, xs1: u64, xs2: u64) -> io::Result<CmdResp> {
    write_struct(&mut self.cmd_stream, &CmdReq::new(funct, xs1, xs2))?;
    let resp: CmdResp = read_struct(&mut self.cmd_stream)?;
    expect_type(&resp.header, MsgType::CmdResp)?;
    Ok(resp)
  }
}

impl Accelerator for CfuClient {
  fn execute(&mut self, cmd: Command) -> Result<i32> {
    let (funct, xs1, xs2) = cmd.encode();
    let resp = self.send_cmd(funct, xs1, xs2)?;
    match resp.status() {
      STATUS_OK => Ok(resp.result as i64 as i32),
      STATUS_PROTOCOL_VIOLATION => Err(protocol_violation(format!("remote CFU rejected {:?}", cmd))),
      STATUS_MALFORMED => Err(protocol_violation(format!("remote CFU could not decode {:?}", cmd))),
      other => Err(ConvError::Io(io::Error::new(
        ErrorKind::InvalidData,
        format!("unknown CFU response status {}", other),
      ))),
    }
  }
}
