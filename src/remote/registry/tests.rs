use super::*;
use crate::remote::{CommandOutput, SshClient, StaticResponse};
use std::fmt;

fn registry_with(host: &str, port: u16, responses: ResponseTable) -> Registry {
    let registry = Registry::new();
    registry.register_device(host, port, responses, None, None);
    registry
}

#[derive(Debug)]
struct Banner;

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("banner exchange failed")
    }
}

impl StdError for Banner {}

#[test]
fn test_register_and_get_device() {
    let registry = registry_with("h1", 22, ResponseTable::new());

    assert!(registry.has_device("h1", 22));
    assert!(!registry.has_device("h1", 2222));
    assert_eq!(registry.get_device("h1", 22).unwrap().key(), "h1:22");

    let err = registry.get_device("h1", 2222).unwrap_err();
    assert!(matches!(err, Error::NotRegistered { ref key } if key == "h1:2222"));
}

#[test]
fn test_register_overwrites() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new().with("a", StaticResponse::stdout("1")),
    );
    registry.register_device("h1", 22, ResponseTable::new(), None, None);

    assert!(registry.get_device("h1", 22).unwrap().responses().is_empty());
    assert_eq!(registry.device_keys(), vec!["h1:22".to_string()]);
}

#[test]
fn test_cleanup_clears_devices_and_local_files() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry.put_local_file("/tmp/a", FileRecord::new("a"));
    let local = registry.local_filesystem();

    registry.cleanup();
    registry.cleanup();

    assert!(registry.device_keys().is_empty());
    assert!(registry.get_local_file("/tmp/a").is_none());
    assert!(local.is_empty());
}

#[test]
fn test_remote_file_helpers() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry.register_device("h1", 2222, ResponseTable::new(), None, None);

    registry
        .put_remote_file("h1", 22, "/etc/issue", FileRecord::new("Debian"))
        .unwrap();
    assert_eq!(
        registry.get_remote_file("h1", 22, "/etc/issue").unwrap(),
        Some(FileRecord::new("Debian"))
    );
    assert_eq!(registry.get_remote_file("h1", 2222, "/etc/issue").unwrap(), None);

    let removed = registry.remove_remote_file("h1", 22, "/etc/issue").unwrap();
    assert!(removed.is_some());
    assert!(matches!(
        registry.put_remote_file("nobody", 22, "/x", FileRecord::default()),
        Err(Error::NotRegistered { .. })
    ));
}

#[test]
fn test_local_files_shared_across_devices() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry.register_device("h2", 22, ResponseTable::new(), None, None);
    registry.put_local_file("/home/me/key", FileRecord::new("k"));

    let h1 = registry.get_device("h1", 22).unwrap();
    let h2 = registry.get_device("h2", 22).unwrap();
    assert!(h1.local_filesystem().same_as(h2.local_filesystem()));
    assert!(h1.local_filesystem().contains("/home/me/key"));

    assert_eq!(registry.remove_local_file("/home/me/key"), Some(FileRecord::new("k")));
    assert!(!h2.local_filesystem().contains("/home/me/key"));
}

#[test]
fn test_failure_helpers_register_on_default_port() {
    let registry = Registry::new();
    registry.setup_dns_failure("h3", None);
    registry.setup_timeout_failure("h4");
    registry.setup_auth_failure("h5");
    registry.setup_connection_refused("h6");
    registry.setup_custom_failure("h7", 2200, Banner);

    let kind = |host: &str, port: u16| {
        registry
            .get_device(host, port)
            .unwrap()
            .connection_failure()
            .map(FailureConfig::kind)
    };
    assert_eq!(kind("h3", 22), Some("dns"));
    assert_eq!(kind("h4", 22), Some("timeout"));
    assert_eq!(kind("h5", 22), Some("authentication"));
    assert_eq!(kind("h6", 22), Some("connection_refused"));
    assert_eq!(kind("h7", 2200), Some("custom"));
    assert!(registry.get_device("h3", 22).unwrap().responses().is_empty());
}

#[test]
fn test_failure_helper_updates_existing_device() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new().with("ls", StaticResponse::stdout("x")),
    );
    registry.setup_timeout_failure("h1");

    let device = registry.get_device("h1", 22).unwrap();
    assert_eq!(device.responses().len(), 1);
    assert!(device.connection_failure().is_some());

    registry.clear_connection_failure("h1", 22).unwrap();
    assert!(registry
        .get_device("h1", 22)
        .unwrap()
        .connection_failure()
        .is_none());
}

#[test]
fn test_edit_response() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new()
            .with("ls", StaticResponse::stdout("a.txt"))
            .with("date", Response::callback(|_, _| CommandOutput::stdout("now"))),
    );

    let edited = registry
        .edit_response("h1", 22, &CommandKey::literal("ls"), |response| {
            response
                .as_static_mut()
                .map(|r| r.append_to_stdout("\nb.txt"))
                .is_some()
        })
        .unwrap();
    assert!(edited);

    let device = registry.get_device("h1", 22).unwrap();
    let output = device.responses().resolve("ls").unwrap().invoke(&device, "ls");
    assert_eq!(output.stdout, b"a.txt\nb.txt");

    let callback_is_static = registry
        .edit_response("h1", 22, &CommandKey::literal("date"), |r| {
            r.as_static_mut().is_some()
        })
        .unwrap();
    assert!(!callback_is_static);

    assert!(matches!(
        registry.edit_response("h1", 22, &CommandKey::literal("pwd"), |_| ()),
        Err(Error::ResponseNotFound { .. })
    ));
}

#[test]
fn test_edit_response_closure_may_use_registry() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new().with("hostname", StaticResponse::stdout("h1")),
    );

    let keys = registry
        .edit_response("h1", 22, &CommandKey::literal("hostname"), |response| {
            if let Some(response) = response.as_static_mut() {
                response.append_to_stdout(".lan");
            }
            registry.device_keys()
        })
        .unwrap();
    assert_eq!(keys, vec!["h1:22".to_string()]);

    let device = registry.get_device("h1", 22).unwrap();
    let output = device
        .responses()
        .resolve("hostname")
        .unwrap()
        .invoke(&device, "hostname");
    assert_eq!(output.stdout, b"h1.lan");
}

#[test]
fn test_edit_response_dropped_when_device_removed_meanwhile() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new().with("ls", StaticResponse::stdout("a")),
    );

    let result = registry.edit_response("h1", 22, &CommandKey::literal("ls"), |_| {
        registry.cleanup();
    });
    assert!(matches!(result, Err(Error::NotRegistered { .. })));
}

#[test]
fn test_add_response() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry
        .add_response(
            "h1",
            22,
            CommandKey::pattern("git .*").unwrap(),
            StaticResponse::stdout("ok"),
        )
        .unwrap();
    assert!(registry
        .get_device("h1", 22)
        .unwrap()
        .responses()
        .resolve("git status")
        .is_ok());
}

#[test]
fn test_history_assertions() {
    let registry = registry_with(
        "h1",
        22,
        ResponseTable::new()
            .with_pattern("ls.*", StaticResponse::stdout(""))
            .unwrap(),
    );
    let mut client = SshClient::with_registry(registry.clone());
    client.connect("h1", 22, None, None).unwrap();
    client.exec_command("ls -l").unwrap();
    client.exec_command("ls -al").unwrap();

    registry.assert_command_executed_on_index("h1", 22, "ls -l", 0);
    registry.assert_command_executed_on_index("h1", 22, "ls -al", 1);
    registry.assert_command_was_executed("h1", 22, "ls -al");
    registry.assert_command_was_not_executed("h1", 22, "ls -alx");
    assert_eq!(registry.command_history("h1", 22).unwrap(), vec!["ls -l", "ls -al"]);
}

#[test]
#[should_panic(expected = "expected 'reboot' to have been executed")]
fn test_assert_executed_fails_when_missing() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry.assert_command_was_executed("h1", 22, "reboot");
}

#[test]
#[should_panic(expected = "unexpected command at index 3")]
fn test_assert_index_out_of_range_fails() {
    let registry = registry_with("h1", 22, ResponseTable::new());
    registry.assert_command_executed_on_index("h1", 22, "ls", 3);
}

#[test]
#[should_panic(expected = "Remote device not registered")]
fn test_assertions_require_registered_device() {
    Registry::new().assert_command_was_not_executed("ghost", 22, "ls");
}

#[test]
fn test_independent_registries() {
    let a = registry_with("h1", 22, ResponseTable::new());
    let b = Registry::new();
    assert!(!a.same_as(&b));
    assert!(a.same_as(&a.clone()));
    assert!(!b.has_device("h1", 22));
}
