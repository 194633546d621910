use gw_security::{SecurityContext, SecurityError, keystore_path};

#[test]
fn generates_keystore_on_first_start() {
    let dir = tempfile::tempdir().expect("tempdir");

    let ctx = SecurityContext::bootstrap(dir.path(), "gateway-test").expect("bootstrap");

    let expected = dir.path().join("security").join("gateway-test.pfx");
    assert_eq!(ctx.keystore_path(), expected.as_path());
    assert!(expected.exists());
    assert!(ctx.certificate().pem().contains("BEGIN CERTIFICATE"));
    assert!(ctx.key_pair().private_key_pem().contains("PRIVATE KEY"));
    assert!(ctx.key_pair().public_key_pem().contains("PUBLIC KEY"));
    assert!(ctx.application_uri().starts_with("urn:"));
    assert!(ctx.application_uri().ends_with(":gateway-test"));
}

#[test]
fn certificate_embeds_local_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = SecurityContext::bootstrap(dir.path(), "gateway-test").expect("bootstrap");

    let names = ctx.certificate().subject_alt_names();
    assert!(names.iter().any(|n| n == "localhost"));
    assert!(names.iter().any(|n| n == "127.0.0.1"));
    for name in gw_security::hostnames::local_subject_names() {
        assert!(names.contains(&name), "missing {name}");
    }
}

#[test]
fn second_start_reuses_keystore() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = SecurityContext::bootstrap(dir.path(), "gateway-test").expect("first");
    let second = SecurityContext::bootstrap(dir.path(), "gateway-test").expect("second");

    assert_eq!(first.certificate(), second.certificate());
    assert_eq!(
        first.key_pair().private_key_pem(),
        second.key_pair().private_key_pem()
    );
    assert_eq!(first.application_uri(), second.application_uri());
}

#[test]
fn corrupt_keystore_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = keystore_path(dir.path(), "gateway-test");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not a keystore").unwrap();

    let err = SecurityContext::bootstrap(dir.path(), "gateway-test").unwrap_err();
    assert!(matches!(err, SecurityError::InvalidKeyStore(_, _)));
}

#[test]
fn private_key_is_redacted_in_debug() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = SecurityContext::bootstrap(dir.path(), "gateway-test").expect("bootstrap");
    let debug = format!("{:?}", ctx.key_pair());
    assert!(!debug.contains(ctx.key_pair().private_key_pem()));
}
