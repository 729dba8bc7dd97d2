//! Integration-style coverage of the full open -> append -> restart -> append lifecycle,
//! exercised the way a caller would: only through `iolog_writer`'s public API.

use iolog_writer::{ElapsedTime, IoLogConfig, IoLogError, SessionOpenInfo, StreamId};

fn open_info(submituser: &str) -> SessionOpenInfo {
    SessionOpenInfo {
        start_time: 1_700_000_000,
        submituser: submituser.to_string(),
        submithost: "build-host".to_string(),
        command: "/usr/bin/vim".to_string(),
        runuser: Some("root".to_string()),
        rungroup: None,
        ttyname: Some("/dev/pts/4".to_string()),
        cwd: Some("/home/alice".to_string()),
        lines: Some(50),
        columns: Some(132),
        argv: vec!["vim".to_string(), "notes.txt".to_string()],
    }
}

#[test]
fn full_lifecycle_across_two_processes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = tempfile::tempdir().unwrap();
    let config = IoLogConfig::with_root(root.path());

    // First "process": open a session and stream a few events to it.
    let log_id = {
        let mut session = iolog_writer::IoLogSession::open(&config, &open_info("alice")).unwrap();
        session
            .append_winsize(ElapsedTime::new(0, 0), 50, 132)
            .unwrap();
        session
            .append_data(StreamId::Stdin, ElapsedTime::new(0, 50_000_000), b"ihello")
            .unwrap();
        session
            .append_data(
                StreamId::Stdout,
                ElapsedTime::new(0, 50_000_000),
                b"hello",
            )
            .unwrap();
        session
            .append_suspend(ElapsedTime::new(1, 0), "SIGTSTP")
            .unwrap();
        assert_eq!(session.elapsed_time(), ElapsedTime::new(1, 100_000_000));

        let info_path = session.path().join("log");
        let info = std::fs::read_to_string(&info_path).unwrap();
        assert!(info.starts_with("1700000000:alice:root::/dev/pts/4:50:132\n"));
        assert!(info.contains("vim notes.txt"));

        session.path().to_str().unwrap().to_string()
        // session drops here, as if the connection to the client were lost.
    };

    // Second "process": the client reconnects and asserts it last saw the state right
    // after "hello" landed on stdout, before the suspend record was appended.
    let resume_point = ElapsedTime::new(0, 100_000_000);
    let mut resumed = iolog_writer::IoLogSession::restart(&log_id, resume_point).unwrap();
    assert_eq!(resumed.elapsed_time(), resume_point);

    // The suspend record (which carried no stream bytes) is truncated away along with
    // everything after it, but the data streams written before it are untouched.
    let stdout = std::fs::read(resumed.path().join("stdout")).unwrap();
    assert_eq!(stdout, b"hello");

    // Further appends build on the resumed elapsed time.
    resumed
        .append_data(StreamId::Stdout, ElapsedTime::new(0, 900_000_000), b"!")
        .unwrap();
    assert_eq!(resumed.elapsed_time(), ElapsedTime::new(1, 0));
    let stdout = std::fs::read(resumed.path().join("stdout")).unwrap();
    assert_eq!(stdout, b"hello!");
}

#[test]
fn restart_rejects_a_target_the_timing_file_never_reached() {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = tempfile::tempdir().unwrap();
    let config = IoLogConfig::with_root(root.path());

    let mut session = iolog_writer::IoLogSession::open(&config, &open_info("bob")).unwrap();
    session
        .append_data(StreamId::Stdout, ElapsedTime::new(0, 100_000_000), b"x")
        .unwrap();
    let log_id = session.path().to_str().unwrap().to_string();
    drop(session);

    let err = iolog_writer::IoLogSession::restart(&log_id, ElapsedTime::new(5, 0)).unwrap_err();
    assert!(matches!(err, IoLogError::RestartUnusable { .. }));
}

#[test]
fn two_sessions_for_the_same_user_get_distinct_directories() {
    let root = tempfile::tempdir().unwrap();
    let config = IoLogConfig::with_root(root.path());

    let first = iolog_writer::IoLogSession::open(&config, &open_info("alice")).unwrap();
    let second = iolog_writer::IoLogSession::open(&config, &open_info("alice")).unwrap();
    assert_ne!(first.path(), second.path());
    assert!(first.path().starts_with(root.path().join("build-host").join("alice")));
}
