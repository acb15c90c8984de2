use cfuconv::arch::cfu::{Accelerator, Cfu, Command, PaddingOpcode};
use cfuconv::backend::{AcceleratorBackend, MatmulBackend, SoftwareBackend};
use cfuconv::error::ConvError;
use cfuconv::kernel::im2col::{lower_filter, lower_input};
use cfuconv::kernel::{ConvGeometry, ConvParams};
use cfuconv::profile::CycleCounter;
use cfuconv::simulator::server::socket::{CfuClient, CfuServer, STATUS_MALFORMED, STATUS_OK};
use cfuconv::simulator::utils::log::init_log;
use cfuconv::tensor::{RuntimeShape, Tensor};
use std::thread;

/// Binds an ephemeral port and serves `clients` connections from a thread.
fn spawn_server(clients: usize) -> (u16, thread::JoinHandle<u64>) {
  let mut server = CfuServer::bind("127.0.0.1", 0, Cfu::new()).unwrap();
  let port = server.local_addr().unwrap().port();
  let handle = thread::spawn(move || {
    for _ in 0..clients {
      server.accept_and_serve().unwrap();
    }
    server.served()
  });
  (port, handle)
}

#[test]
fn remote_cfu_matches_software_reference() {
  init_log();
  let (port, handle) = spawn_server(1);

  let params = ConvParams::default().with_padding(1, 1).with_offsets(-20, 0);
  let in_shape = RuntimeShape::new(vec![1, 3, 5, 2]);
  let f_shape = RuntimeShape::new(vec![5, 3, 3, 2]);
  let out_shape = RuntimeShape::new(vec![1, 3, 5, 5]);
  let input: Vec<i8> = (0..30).map(|v| (v * 7 % 200 - 100) as i8).collect();
  let filter: Vec<i8> = (0..90).map(|v| (v * 13 % 256 - 128) as i8).collect();
  let geom = ConvGeometry::new(&params, &in_shape, &f_shape, None, &out_shape).unwrap();
  let lowered_filter = lower_filter(&geom, &Tensor::new(&f_shape, &filter).unwrap());
  let lowered_input = lower_input(&geom, &Tensor::new(&in_shape, &input).unwrap(), 0);

  let expected = SoftwareBackend::new()
    .matmul(&lowered_filter, &lowered_input, params.input_offset, &mut CycleCounter::default())
    .unwrap();

  let client = CfuClient::connect("127.0.0.1", port).unwrap();
  let mut backend = AcceleratorBackend::new(client);
  let actual = backend
    .matmul(&lowered_filter, &lowered_input, params.input_offset, &mut CycleCounter::default())
    .unwrap();
  assert_eq!(actual.first_mismatch(&expected), None);

  let issued = backend.commands();
  drop(backend);
  assert_eq!(handle.join().unwrap(), issued);
}

#[test]
fn remote_violation_is_reported_as_protocol_error() {
  let (port, handle) = spawn_server(1);
  let mut client = CfuClient::connect("127.0.0.1", port).unwrap();

  let err = client.execute(Command::ReadResult);
  assert!(matches!(err, Err(ConvError::ProtocolViolation(_))));

  // the unit is idle again and accepts a fresh sequence
  client.execute(Command::LoadFilterPair { values: [2, 0] }).unwrap();
  client.execute(Command::LoadFilterPair { values: [0, 0] }).unwrap();
  client
    .execute(Command::LoadInputPair {
      padding: PaddingOpcode::Both,
      values: [-4, 1],
    })
    .unwrap();
  client
    .execute(Command::LoadInputPair {
      padding: PaddingOpcode::Neither,
      values: [0, 0],
    })
    .unwrap();
  client
    .execute(Command::StartCompute {
      kernel_volume: 1,
      input_offset: 1,
    })
    .unwrap();
  assert_eq!(client.execute(Command::ReadResult).unwrap(), -6);
  assert_eq!(client.execute(Command::ReadResult).unwrap(), 4);

  drop(client);
  handle.join().unwrap();
}

#[test]
fn remote_offset_overflow_keeps_server_alive() {
  let (port, handle) = spawn_server(1);
  let mut client = CfuClient::connect("127.0.0.1", port).unwrap();

  client.execute(Command::LoadFilterPair { values: [1, 0] }).unwrap();
  client.execute(Command::LoadFilterPair { values: [0, 0] }).unwrap();
  client
    .execute(Command::LoadInputPair {
      padding: PaddingOpcode::Both,
      values: [i32::MAX, 0],
    })
    .unwrap();
  client
    .execute(Command::LoadInputPair {
      padding: PaddingOpcode::Neither,
      values: [0, 0],
    })
    .unwrap();
  let err = client.execute(Command::StartCompute {
    kernel_volume: 1,
    input_offset: 1,
  });
  assert!(matches!(err, Err(ConvError::ProtocolViolation(_))));

  // the connection is still served and the unit starts from idle
  assert!(matches!(client.execute(Command::ReadResult), Err(ConvError::ProtocolViolation(_))));

  drop(client);
  assert_eq!(handle.join().unwrap(), 6);
}

#[test]
fn malformed_command_gets_malformed_status() {
  let (port, handle) = spawn_server(1);
  let mut client = CfuClient::connect("127.0.0.1", port).unwrap();

  // op 6 is not part of the command set
  let resp = client.send_cmd(6, 0, 0).unwrap();
  assert_eq!(resp.status(), STATUS_MALFORMED);

  let (funct, xs1, xs2) = Command::LoadFilterPair { values: [1, 1] }.encode();
  assert_eq!(client.send_cmd(funct, xs1, xs2).unwrap().status(), STATUS_OK);

  drop(client);
  assert_eq!(handle.join().unwrap(), 2);
}
