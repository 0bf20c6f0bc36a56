use anyhow::Result;
use serial_test::serial;
use sshmock::remote::{
    CommandOutput, Credentials, FileTransfer, RemoteFile, RemoteShell, Response, ResponseTable,
    SshClient,
};
use sshmock::vfs::FileRecord;
use sshmock::{Error, Registry};

// Application-style helpers, written against the traits only.

fn write_remote_file<C: RemoteShell>(client: &mut C, path: &str, content: &str) -> Result<()> {
    client.connect("some_host_4", 22, Some("root"), Some("root"))?;
    let sftp = client.open_sftp()?;
    let mut file = sftp.open(path, "w")?;
    file.write(content.as_bytes())?;
    file.close();
    sftp.close();
    Ok(())
}

fn read_remote_file<C: RemoteShell>(client: &mut C, path: &str) -> Result<Vec<u8>> {
    client.connect("some_host_4", 22, Some("root"), Some("root"))?;
    let sftp = client.open_sftp()?;
    let mut file = sftp.open(path, "r")?;
    let output = file.read()?;
    file.close();
    sftp.close();
    Ok(output)
}

fn register_host(registry: &Registry) {
    registry.register_device(
        "some_host_4",
        22,
        ResponseTable::new(),
        Some(Credentials::new("root", "root")),
        None,
    );
}

#[test]
#[serial]
fn test_write_lands_in_remote_filesystem() -> Result<()> {
    let registry = Registry::global();
    registry.cleanup();
    register_host(&registry);

    let mut client = SshClient::new();
    write_remote_file(&mut client, "/tmp/afileToWrite.txt", "Something to put in the remote file")?;

    let record = registry
        .get_remote_file("some_host_4", 22, "/tmp/afileToWrite.txt")?
        .expect("file should exist");
    assert_eq!(record.content_str(), "Something to put in the remote file");

    registry.cleanup();
    Ok(())
}

#[test]
#[serial]
fn test_read_pre_registered_file() -> Result<()> {
    let registry = Registry::global();
    registry.cleanup();
    register_host(&registry);
    registry.put_remote_file(
        "some_host_4",
        22,
        "/tmp/afileToRead.txt",
        FileRecord::new("Something from the remote file"),
    )?;

    let mut client = SshClient::new();
    let output = read_remote_file(&mut client, "/tmp/afileToRead.txt")?;
    assert_eq!(output, b"Something from the remote file");

    registry.cleanup();
    Ok(())
}

#[test]
fn test_round_trip_in_one_session() -> Result<()> {
    let registry = Registry::new();
    register_host(&registry);
    let mut client = SshClient::with_registry(registry.clone());

    write_remote_file(&mut client, "/tmp/a", "payload \u{1F980}")?;
    let sftp = client.open_sftp()?;
    let mut file = sftp.open("/tmp/a", "r")?;
    assert_eq!(file.read()?, "payload \u{1F980}".as_bytes());
    assert_eq!(file.read()?, "payload \u{1F980}".as_bytes());
    Ok(())
}

#[test]
fn test_read_missing_file_fails() -> Result<()> {
    let registry = Registry::new();
    register_host(&registry);
    let mut client = SshClient::with_registry(registry);

    let err = read_remote_file(&mut client, "/nope").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::FileNotFound { path }) if path == "/nope"
    ));
    Ok(())
}

#[test]
fn test_put_and_get_between_local_and_remote() -> Result<()> {
    let registry = Registry::new();
    register_host(&registry);
    registry.put_local_file("/home/me/config.toml", FileRecord::new("debug = true\n"));

    let mut client = SshClient::with_registry(registry.clone());
    client.connect("some_host_4", 22, Some("root"), Some("root"))?;
    let sftp = client.open_sftp()?;

    let attrs = sftp.put("/home/me/config.toml", "/etc/app/config.toml")?;
    assert_eq!(attrs.size, 13);
    assert_eq!(sftp.listdir("/etc/app")?, vec!["config.toml"]);

    sftp.get("/etc/app/config.toml", "/home/me/backup.toml")?;
    assert_eq!(
        registry.get_local_file("/home/me/backup.toml"),
        Some(FileRecord::new("debug = true\n"))
    );
    Ok(())
}

#[test]
fn test_devices_have_separate_remote_filesystems() -> Result<()> {
    let registry = Registry::new();
    registry.register_device("h", 22, ResponseTable::new(), None, None);
    registry.register_device("h", 2222, ResponseTable::new(), None, None);

    let mut client = SshClient::with_registry(registry.clone());
    client.connect("h", 22, None, None)?;
    let mut file = client.open_sftp()?.open("/srv/data", "w")?;
    file.write("on 22")?;

    assert!(registry.get_remote_file("h", 22, "/srv/data")?.is_some());
    assert!(registry.get_remote_file("h", 2222, "/srv/data")?.is_none());
    Ok(())
}

#[test]
fn test_callback_writes_are_visible_over_sftp() -> Result<()> {
    let registry = Registry::new();
    registry.register_device(
        "h",
        22,
        ResponseTable::new().with_pattern(
            "touch ",
            Response::callback(|device, command| {
                let path = command.trim_start_matches("touch ");
                device.filesystem().add_file(path, FileRecord::default());
                CommandOutput::default()
            }),
        )?,
        None,
        None,
    );

    let mut client = SshClient::with_registry(registry);
    client.connect("h", 22, None, None)?;
    client.exec_command("touch /tmp/marker")?;
    assert_eq!(client.open_sftp()?.stat("/tmp/marker")?.size, 0);
    Ok(())
}

#[test]
fn test_sftp_unusable_after_ssh_close() -> Result<()> {
    let registry = Registry::new();
    register_host(&registry);
    let mut client = SshClient::with_registry(registry);
    client.connect("some_host_4", 22, Some("root"), Some("root"))?;
    let sftp = client.open_sftp()?;

    client.close();
    assert!(matches!(
        sftp.open("/tmp/a", "w"),
        Err(Error::NoValidConnections { .. })
    ));
    assert!(matches!(client.open_sftp(), Err(Error::NoValidConnections { .. })));
    Ok(())
}

#[test]
fn test_sftp_session_does_not_survive_reregistration() -> Result<()> {
    let registry = Registry::new();
    register_host(&registry);
    let mut client = SshClient::with_registry(registry.clone());
    client.connect("some_host_4", 22, Some("root"), Some("root"))?;
    let sftp = client.open_sftp()?;

    register_host(&registry);
    let err = sftp.open("/tmp/a", "w").unwrap_err();
    assert!(matches!(err, Error::NotRegistered { ref key } if key == "some_host_4:22"));
    assert!(registry.get_remote_file("some_host_4", 22, "/tmp/a")?.is_none());

    write_remote_file(&mut client, "/tmp/a", "fresh")?;
    assert!(registry.get_remote_file("some_host_4", 22, "/tmp/a")?.is_some());
    Ok(())
}
