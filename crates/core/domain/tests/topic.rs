use domain::{Format, SourceType, Topic, TopicType};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

fn hash_of(topic: &Topic) -> u64 {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn parses_opc_node_with_namespace_shorthand() {
    let topic = Topic::parse("Opc/dev1/Node/2/Demo/Counter");

    assert_eq!(topic.source_type(), SourceType::Opc);
    assert_eq!(topic.topic_type(), TopicType::Node);
    assert_eq!(topic.system_name(), "dev1");
    assert_eq!(topic.address(), "ns=2;s=Demo/Counter");
    assert_eq!(topic.format(), Format::Json);
    assert!(topic.is_valid());
}

#[test]
fn parses_keywords_case_insensitively_with_format() {
    let topic = Topic::parse("opc/dev1/node:value/ns=2;i=7");

    assert_eq!(topic.source_type(), SourceType::Opc);
    assert_eq!(topic.topic_type(), TopicType::Node);
    assert_eq!(topic.format(), Format::Value);
    assert_eq!(topic.address(), "ns=2;i=7");
}

#[test]
fn parses_path_topics() {
    let topic = Topic::parse("Opc/dev1/Path:Pretty/$objects/Demo/#");
    assert_eq!(topic.topic_type(), TopicType::Path);
    assert_eq!(topic.format(), Format::Pretty);
    assert_eq!(topic.browse_path(), vec!["$objects", "Demo", "#"]);

    let single = Topic::parse("Opc/dev1/Path/Demo");
    assert!(!single.is_valid());

    let mqtt = Topic::parse("Mqtt/broker/Path/plant/line1");
    assert_eq!(mqtt.source_type(), SourceType::Mqtt);
    assert_eq!(mqtt.address(), "plant/line1");

    let plc = Topic::parse("Plc/s7/Node/DB1.DBW0");
    assert_eq!(plc.topic_type(), TopicType::Node);

    let sys = Topic::parse("$SYS/broker/uptime");
    assert_eq!(sys.source_type(), SourceType::Sys);
    assert_eq!(sys.topic_type(), TopicType::Path);
}

#[test]
fn unrecognised_names_are_unknown() {
    for name in ["foo/bar", "Opc/dev-1/Node/x", "Opc/dev1/Symbol/x", "Opc/dev1/Node:Csv/x", "Opc"] {
        let topic = Topic::parse(name);
        assert!(!topic.is_valid(), "{name} should not be valid");
    }
    assert_eq!(Topic::parse("foo/bar").source_type(), SourceType::Unknown);
    assert_eq!(Topic::parse("foo/bar").name(), "foo/bar");
}

#[test]
fn name_round_trips_through_parse() {
    for name in [
        "Opc/dev1/Node/ns=2;s=Demo/Counter",
        "opc/dev1/Path/$objects/Demo/+",
        "$SYS/clients",
        "some/other/topic",
    ] {
        let topic = Topic::parse(name);
        assert_eq!(Topic::parse(&topic.name()), topic);
    }
}

#[test]
fn equality_and_hash_follow_source_type_and_path() {
    let a = Topic::parse("Opc/dev1/Node/ns=2;s=A");
    let b = Topic::new(SourceType::Opc, "dev1/Node/ns=2;s=A");
    let other_source = Topic::new(SourceType::Plc, "dev1/Node/ns=2;s=A");
    let other_path = Topic::new(SourceType::Opc, "dev1/Node/ns=2;s=B");

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_ne!(a, other_source);
    assert_ne!(a, other_path);

    let mut map = HashMap::new();
    map.insert(a.clone(), 1);
    map.insert(b, 2);
    map.insert(other_source, 3);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&a), Some(&2));
}

#[test]
fn node_topic_keeps_system_and_format() {
    let path = Topic::parse("Opc/dev1/Path:Value/$objects/Demo/#");
    let node = path.node_topic("ns=2;s=Demo/Counter");

    assert_eq!(node.name(), "Opc/dev1/Node:Value/ns=2;s=Demo/Counter");
    assert_eq!(node.topic_type(), TopicType::Node);
    assert_eq!(node.format(), Format::Value);
    assert_eq!(node.address(), "ns=2;s=Demo/Counter");
}
