use super::protocol::*;
use crate::arch::cfu::{Accelerator, Command};
use crate::error::ConvError;
use std::io::{ErrorKind, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Hosts an accelerator behind the command socket, one client at a time.
pub struct CfuServer<A: Accelerator> {
  listener: TcpListener,
  device: A,
  served: u64,
}

impl<A: Accelerator> CfuServer<A> {
  pub fn bind(host: &str, port: u16, device: A) -> Result<Self> {
    let listener = TcpListener::bind((host, port))?;
    log::info!("CFU server listening on {}", listener.local_addr()?);
    Ok(Self {
      listener,
      device,
      served: 0,
    })
  }

  pub fn local_addr(&self) -> Result<SocketAddr> {
    self.listener.local_addr()
  }

  pub fn device(&self) -> &A {
    &self.device
  }

  /// Commands answered since the server was bound.
  pub fn served(&self) -> u64 {
    self.served
  }

  /// Serves a single client until it disconnects. Client errors are
  /// logged; only a failed accept is returned.
  pub fn accept_and_serve(&mut self) -> Result<()> {
    let (stream, addr) = self.listener.accept()?;
    log::info!("CFU client connected from {}", addr);
    match self.serve_client(stream) {
      Ok(()) => log::info!("CFU client {} disconnected", addr),
      Err(e) => log::warn!("error serving CFU client {}: {}", addr, e),
    }
    Ok(())
  }

  pub fn serve_forever(&mut self) -> Result<()> {
    loop {
      self.accept_and_serve()?;
    }
  }

  fn serve_client(&mut self, mut stream: TcpStream) -> Result<()> {
    loop {
      let req = match read_struct::<CmdReq, _>(&mut stream) {
        Ok(req) => req,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
        Err(e) => return Err(e),
      };
      expect_type(&req.header, MsgType::CmdReq)?;

      let resp = self.handle(&req);
      write_struct(&mut stream, &resp)?;
    }
  }

  fn handle(&mut self, req: &CmdReq) -> CmdResp {
    self.served += 1;
    let cmd = match Command::decode(req.funct, req.xs1, req.xs2) {
      Ok(cmd) => cmd,
      Err(e) => {
        log::warn!("malformed CFU command funct={:#x}: {}", req.funct, e);
        return CmdResp::new(STATUS_MALFORMED, 0);
      },
    };
    match self.device.execute(cmd) {
      Ok(value) => CmdResp::new(STATUS_OK, value as i64 as u64),
      Err(ConvError::ProtocolViolation(_)) => CmdResp::new(STATUS_PROTOCOL_VIOLATION, 0),
      Err(e) => {
        log::warn!("CFU device failed: {}", e);
        CmdResp::new(STATUS_MALFORMED, 0)
      },
    }
  }
}
