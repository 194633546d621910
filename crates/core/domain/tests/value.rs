use domain::{BuiltinType, StatusCode, Value, Variant};

#[test]
fn converts_text_by_builtin_type() {
    assert_eq!(
        Variant::from_text(BuiltinType::Boolean, "0"),
        Ok(Variant::Boolean(false))
    );
    assert_eq!(
        Variant::from_text(BuiltinType::Boolean, "TRUE"),
        Ok(Variant::Boolean(true))
    );
    assert_eq!(
        Variant::from_text(BuiltinType::Int16, " -12 "),
        Ok(Variant::Int16(-12))
    );
    assert_eq!(
        Variant::from_text(BuiltinType::Double, "1.5"),
        Ok(Variant::Double(1.5))
    );
    assert_eq!(
        Variant::from_text(BuiltinType::String, "hello"),
        Ok(Variant::String("hello".to_string()))
    );
}

#[test]
fn rejects_out_of_range_text() {
    let err = Variant::from_text(BuiltinType::Byte, "256").unwrap_err();
    assert_eq!(err.expected, BuiltinType::Byte);
    assert!(Variant::from_text(BuiltinType::Boolean, "yes").is_err());
}

#[test]
fn float_equality_is_bitwise() {
    assert_eq!(Variant::Double(f64::NAN), Variant::Double(f64::NAN));
    assert_ne!(Variant::Float(0.0), Variant::Float(-0.0));
    assert_ne!(Variant::Int32(1), Variant::UInt32(1));
}

#[test]
fn status_severity() {
    assert!(StatusCode::GOOD.is_good());
    assert!(!StatusCode::UNCERTAIN.is_good());
    assert!(!StatusCode::UNCERTAIN.is_bad());
    assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());

    let value = Value::bad(StatusCode::BAD_NOT_CONNECTED);
    assert_eq!(value.variant, Variant::Null);
    assert!(value.source_time_ms > 0);
}
