mod common;

use std::io::{self, Read};
use std::sync::Arc;

use common::{memory_device, memory_manager, test_config};
use luadrv::device::{ContextSlot, Device, DeviceEvent, EventKind, ScriptedEvents};
use luadrv::session::mlua::{Lua, Table, Value};
use luadrv::session::{Extension, Outcome};

/// Hands out `good` and then fails, like a user pointer that runs into an unmapped page.
struct Faulting<'a> {
    good: &'a [u8],
}

impl Read for Faulting<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.good.is_empty() {
            return Err(io::Error::other("bad address"));
        }
        let n = self.good.len().min(buf.len());
        buf[..n].copy_from_slice(&self.good[..n]);
        self.good = &self.good[n..];
        Ok(n)
    }
}

#[test]
fn test_successful_release_returns_zero() {
    let (device, sink) = memory_device(&test_config());
    let mut slot = ContextSlot::new();

    assert_eq!(device.open(&mut slot), 0);
    assert!(!slot.is_empty());
    assert_eq!(device.write(&slot, b"return "), 7);
    assert_eq!(device.write(&slot, b"6 * 7"), 5);
    assert_eq!(device.release(&mut slot), 0);
    assert!(slot.is_empty());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1.message, "42");
}

#[test]
fn test_compile_and_runtime_failures_are_canceled() {
    let (device, sink) = memory_device(&test_config());

    for script in ["syntax(((", "error('boom')"] {
        let mut slot = ContextSlot::new();
        assert_eq!(device.open(&mut slot), 0);
        device.write(&slot, script.as_bytes());
        assert_eq!(device.release(&mut slot), -libc::ECANCELED);
    }

    let outcomes: Vec<_> = sink.records().into_iter().map(|(_, r)| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![Outcome::CompileFailure, Outcome::ExecutionFailure]
    );
    assert_eq!(device.manager().live_interpreters(), 0);
    assert_eq!(device.manager().session_count(), 0);
}

#[test]
fn test_second_release_is_bad_handle() {
    let (device, sink) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    device.open(&mut slot);
    device.write(&slot, b"return 1");

    assert_eq!(device.release(&mut slot), 0);
    assert_eq!(device.release(&mut slot), -libc::EBADF);
    assert_eq!(sink.records().len(), 1);
}

#[test]
fn test_calls_on_unopened_slot_are_bad_handle() {
    let (device, _) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    assert_eq!(device.write(&slot, b"return 1"), -libc::EBADF as isize);
    assert_eq!(device.read(&slot, &mut [0u8; 8]), -libc::EBADF as isize);
    assert_eq!(device.release(&mut slot), -libc::EBADF);
}

#[test]
fn test_open_on_occupied_slot_is_busy() {
    let (device, _) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    assert_eq!(device.open(&mut slot), 0);
    assert_eq!(device.open(&mut slot), -libc::EBUSY);
    assert_eq!(device.manager().session_count(), 1);
    assert_eq!(device.release(&mut slot), 0);
}

#[test]
fn test_read_returns_no_data() {
    let (device, _) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    device.open(&mut slot);
    device.write(&slot, b"return 'hidden'");

    let mut buf = [0xAAu8; 16];
    assert_eq!(device.read(&slot, &mut buf), 0);
    assert!(buf.iter().all(|&b| b == 0xAA));
    assert_eq!(device.release(&mut slot), 0);
}

#[test]
fn test_copy_fault_discards_partial_chunk() {
    let (device, sink) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    device.open(&mut slot);

    let mut reader: &[u8] = b"return 'kept'";
    assert_eq!(device.write_from(&slot, &mut reader, 13), 13);

    let mut faulting = Faulting { good: b" .. 'lost'" };
    assert_eq!(
        device.write_from(&slot, &mut faulting, 64),
        -libc::EFAULT as isize
    );

    assert_eq!(device.release(&mut slot), 0);
    let (_, result) = sink.records().pop().unwrap();
    assert_eq!(result.message, "kept");
}

#[test]
fn test_short_reader_is_copy_fault() {
    let (device, _) = memory_device(&test_config());
    let mut slot = ContextSlot::new();
    device.open(&mut slot);

    let mut reader: &[u8] = b"return";
    assert_eq!(
        device.write_from(&slot, &mut reader, 100),
        -libc::EFAULT as isize
    );
    assert_eq!(device.release(&mut slot), 0, "buffer should still be empty");
}

#[test]
fn test_source_limit_is_out_of_memory() {
    let mut config = test_config();
    config.max_source_bytes = Some(4);
    let (device, _) = memory_device(&config);
    let mut slot = ContextSlot::new();
    device.open(&mut slot);

    assert_eq!(device.write(&slot, b"return 1"), -libc::ENOMEM as isize);
    assert_eq!(device.release(&mut slot), 0);
}

struct HideLoad;

impl Extension for HideLoad {
    fn name(&self) -> &str {
        "hide_load"
    }

    fn open(&self, lua: &Lua) -> luadrv::session::mlua::Result<Table> {
        lua.globals().set("load", Value::Nil)?;
        lua.create_table()
    }
}

#[test]
fn test_missing_load_fails_open_with_canceled() {
    let (mut manager, sink) = memory_manager(&test_config());
    manager.register_extension(Arc::new(HideLoad));
    let device = Device::with_manager(manager);

    let mut slot = ContextSlot::new();
    assert_eq!(device.open(&mut slot), -libc::ECANCELED);
    assert!(slot.is_empty());
    assert_eq!(device.manager().session_count(), 0);
    assert_eq!(device.manager().live_interpreters(), 0);
    assert!(sink.records().is_empty());
}

#[test]
fn test_serve_interleaved_files() {
    let (device, sink) = memory_device(&test_config());
    let mut events = ScriptedEvents::new();
    events
        .push(DeviceEvent::Open { file: 1 })
        .push(DeviceEvent::Open { file: 2 })
        .push(DeviceEvent::Write {
            file: 1,
            data: b"return ".to_vec(),
        })
        .push(DeviceEvent::Write {
            file: 2,
            data: b"return 'two'".to_vec(),
        })
        .push(DeviceEvent::Write {
            file: 1,
            data: b"'one'".to_vec(),
        })
        .push(DeviceEvent::Read { file: 2, len: 32 })
        .push(DeviceEvent::Release { file: 2 })
        .push(DeviceEvent::Release { file: 1 });

    assert_eq!(device.serve(&mut events), 8);
    assert_eq!(events.release_status(1), Some(0));
    assert_eq!(events.release_status(2), Some(0));

    let read = events
        .completions()
        .iter()
        .find(|c| c.kind == EventKind::Read)
        .unwrap();
    assert_eq!(read.ret, 0);

    let messages: Vec<_> = sink.records().into_iter().map(|(_, r)| r.message).collect();
    assert_eq!(messages, vec!["two".to_string(), "one".to_string()]);
}

#[test]
fn test_serve_releases_files_left_open() {
    let (device, sink) = memory_device(&test_config());
    let mut events = ScriptedEvents::new();
    events
        .push(DeviceEvent::Open { file: 9 })
        .push(DeviceEvent::Write {
            file: 9,
            data: b"return 'orphan'".to_vec(),
        });

    assert_eq!(device.serve(&mut events), 2);
    assert_eq!(events.release_status(9), Some(0));
    assert_eq!(sink.records()[0].1.message, "orphan");
    assert_eq!(device.manager().session_count(), 0);
}

#[test]
fn test_serve_unknown_file_is_bad_handle() {
    let (device, _) = memory_device(&test_config());
    let mut events = ScriptedEvents::new();
    events
        .push(DeviceEvent::Write {
            file: 4,
            data: b"x".to_vec(),
        })
        .push(DeviceEvent::Release { file: 4 });

    device.serve(&mut events);
    assert!(
        events
            .completions()
            .iter()
            .all(|c| c.ret == -libc::EBADF as isize)
    );
}

#[cfg(feature = "json")]
#[test]
fn test_json_module_reachable_from_script() {
    let (device, sink) = memory_device(&test_config());
    let mut events = ScriptedEvents::new();
    events.push_script(
        1,
        b"local t = json.decode('{\"n\": 5}')\nreturn t.n * 2",
        5,
    );
    device.serve(&mut events);
    assert_eq!(events.release_status(1), Some(0));
    assert_eq!(sink.records()[0].1.message, "10");
}
