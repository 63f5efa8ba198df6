//! Type registry lookups, synthesis from flat metadata and Any handling

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proto_descriptors::descriptor::{
    DescriptorKind, EnumDef, FieldDef, FileDef, Kind, Label, MessageDef, ScalarType, Syntax,
};
use proto_descriptors::dynamic::Generated;
use proto_descriptors::registry::{FlatEnum, FlatField, FlatKind, FlatOption, FlatType};
use proto_descriptors::{
    wellknown, AnyEnvelope, DynamicMessage, FlatApi, FlatDescription, MessageDescriptor,
    ReflectError, RegistryConfig, TypeRegistry, Value,
};

// =============================================================================
// Fixtures
// =============================================================================

fn message_fixture(json: &str) -> FlatType {
    match FlatDescription::from_json(json).unwrap() {
        FlatDescription::Message(t) => t,
        other => panic!("expected a message fixture, got {:?}", other),
    }
}

fn enum_fixture(json: &str) -> FlatEnum {
    match FlatDescription::from_json(json).unwrap() {
        FlatDescription::Enum(e) => e,
        other => panic!("expected an enum fixture, got {:?}", other),
    }
}

fn opt(name: &str, value: Value) -> FlatOption {
    FlatOption::new(name, AnyEnvelope::wrap(&value).unwrap())
}

/// Custom options extending the descriptor.proto option messages
fn testprotos() -> FileDef {
    let ext = |name: &str, number: i32, ty: ScalarType, options: &str| {
        FieldDef::scalar(name, number, ty).extending(format!(".google.protobuf.{}", options))
    };
    FileDef::new("testprotos/options.proto", "testprotos")
        .with_dependency("google/protobuf/descriptor.proto")
        .with_message(
            MessageDef::new("ReallySimpleMessage")
                .with_field(FieldDef::scalar("id", 1, ScalarType::Uint64))
                .with_field(FieldDef::scalar("name", 2, ScalarType::String)),
        )
        .with_enum(EnumDef::new("ReallySimpleEnum").with_value("VALUE", 1))
        .with_extension(ext("ffubar", 10101, ScalarType::String, "FieldOptions").repeated())
        .with_extension(ext("ffubarb", 10102, ScalarType::Bytes, "FieldOptions"))
        .with_extension(ext("mfubar", 10101, ScalarType::Bool, "MessageOptions"))
        .with_extension(ext("efubar", 10101, ScalarType::Int32, "EnumOptions"))
        .with_extension(ext("efubars", 10102, ScalarType::Sint32, "EnumOptions"))
        .with_extension(ext("efubarsf", 10103, ScalarType::Sfixed32, "EnumOptions"))
        .with_extension(ext("efubaru", 10104, ScalarType::Uint32, "EnumOptions"))
        .with_extension(ext("efubaruf", 10105, ScalarType::Fixed32, "EnumOptions"))
        .with_extension(ext("evfubar", 10101, ScalarType::Int64, "EnumValueOptions"))
        .with_extension(ext("evfubars", 10102, ScalarType::Sint64, "EnumValueOptions"))
        .with_extension(ext("evfubarsf", 10103, ScalarType::Sfixed64, "EnumValueOptions"))
        .with_extension(ext("evfubaru", 10104, ScalarType::Uint64, "EnumValueOptions"))
        .with_extension(ext("evfubaruf", 10105, ScalarType::Fixed64, "EnumValueOptions"))
        .with_extension(
            FieldDef::message("sfubar", 10101, "ReallySimpleMessage")
                .extending(".google.protobuf.ServiceOptions"),
        )
        .with_extension(
            FieldDef::enumeration("sfubare", 10102, "ReallySimpleEnum")
                .extending(".google.protobuf.ServiceOptions"),
        )
        .with_extension(ext("mtfubar", 10101, ScalarType::Float, "MethodOptions").repeated())
        .with_extension(ext("mtfubard", 10102, ScalarType::Double, "MethodOptions"))
}

/// Flat descriptions served by the test fetcher, keyed by normalized URL
fn fetched_types() -> HashMap<String, FlatDescription> {
    let deprecated = || opt("deprecated", Value::Bool(true));

    let mut some_type = message_fixture(include_str!("fixtures/some_type.json"));
    some_type.fields[0].options = vec![
        deprecated(),
        opt("testprotos.ffubar", Value::String("foo".into())),
        opt("testprotos.ffubar", Value::String("bar".into())),
        opt("testprotos.ffubar", Value::String("baz".into())),
        opt("testprotos.ffubarb", Value::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8])),
    ];
    some_type.options = vec![deprecated(), opt("testprotos.mfubar", Value::Bool(true))];

    let mut some_enum = enum_fixture(include_str!("fixtures/some_enum.json"));
    some_enum.options.insert(0, deprecated());
    for (suffix, value) in [
        ("", Value::I32(-42)),
        ("s", Value::I32(-42)),
        ("sf", Value::I32(-42)),
        ("u", Value::U32(42)),
        ("uf", Value::U32(42)),
    ] {
        some_enum.options.push(opt(&format!("testprotos.efubar{}", suffix), value));
    }
    some_enum.values[0].options.push(deprecated());
    for (suffix, value) in [
        ("", Value::I64(-420420420420)),
        ("s", Value::I64(-420420420420)),
        ("sf", Value::I64(-420420420420)),
        ("u", Value::U64(420420420420)),
        ("uf", Value::U64(420420420420)),
    ] {
        some_enum.values[0]
            .options
            .push(opt(&format!("testprotos.evfubar{}", suffix), value));
    }

    let mut types = HashMap::new();
    types.insert("https://foo.bar/some.Type".to_string(), some_type.into());
    types.insert("https://foo.bar/some.Enum".to_string(), some_enum.into());
    for (url, json) in [
        ("https://foo.bar/some.OtherType", include_str!("fixtures/other_type.json")),
        (
            "https://foo.bar/some.OtherType.AnotherType",
            include_str!("fixtures/another_type.json"),
        ),
        (
            "https://foo.bar/some.YetAnother.MessageType",
            include_str!("fixtures/yet_another.json"),
        ),
    ] {
        types.insert(url.to_string(), FlatDescription::from_json(json).unwrap());
    }
    types
}

fn fetcher(
    types: HashMap<String, FlatDescription>,
) -> impl Fn(&str, bool) -> anyhow::Result<Option<FlatDescription>> + Send + Sync {
    move |url: &str, want_enum: bool| -> anyhow::Result<Option<FlatDescription>> {
        match types.get(url) {
            None => Ok(None),
            Some(t) if t.is_enum() == want_enum => Ok(Some(t.clone())),
            Some(_) => Err(anyhow::anyhow!("bad type for {}", url)),
        }
    }
}

/// Route library logs through the test harness; `RUST_LOG=debug` shows synthesis
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fetching_registry() -> TypeRegistry {
    init_tracing();
    let registry = TypeRegistry::new().with_fetcher(fetcher(fetched_types()));
    registry.pool().add_file(testprotos()).unwrap();
    registry
}

fn widget_file() -> FileDef {
    FileDef::new("acme/widget.proto", "acme")
        .with_syntax(Syntax::Proto3)
        .with_message(
            MessageDef::new("Widget")
                .with_field(FieldDef::scalar("id", 1, ScalarType::Uint64))
                .with_field(FieldDef::scalar("name", 2, ScalarType::String))
                .with_field(FieldDef::message("parts", 3, "Part").repeated())
                .with_message(MessageDef::new("Part").with_field(FieldDef::scalar(
                    "label",
                    1,
                    ScalarType::String,
                ))),
        )
        .with_enum(EnumDef::new("Shape").with_value("ROUND", 0).with_value("SQUARE", 1))
}

fn message_type(kind: Kind) -> MessageDescriptor {
    match kind {
        Kind::Message(m) => m,
        other => panic!("expected a message type, got {:?}", other),
    }
}

// =============================================================================
// Registration and lookup
// =============================================================================

#[test]
fn test_lookup_registered_types() {
    let registry = TypeRegistry::new();
    let file = registry.pool().add_file(widget_file()).unwrap();
    let widget = registry.pool().get_message_by_name("acme.Widget").unwrap();
    let shape = registry.pool().get_enum_by_name("acme.Shape").unwrap();

    registry.add_message("foo.bar/acme.Widget", &widget).unwrap();
    registry.add_enum("foo.bar/acme.Shape", &shape).unwrap();

    let found = registry.find_message_by_url("foo.bar/acme.Widget").unwrap().unwrap();
    assert_eq!(found, widget);
    assert_eq!(registry.compute_url(&found.into()), "https://foo.bar/acme.Widget");
    let found = registry.find_enum_by_url("https://foo.bar/acme.Shape").unwrap().unwrap();
    assert_eq!(found, shape);

    // wrong domain
    assert!(registry.find_message_by_url("type.googleapis.com/acme.Widget").unwrap().is_none());

    // nested types come along with add_file
    registry.add_file("frob.nitz/foo.bar", &file).unwrap();
    let part = registry
        .find_message_by_url("frob.nitz/foo.bar/acme.Widget.Part")
        .unwrap()
        .unwrap();
    assert_eq!(part.full_name(), "acme.Widget.Part");
    assert_eq!(
        registry.compute_url(&part.into()),
        "https://frob.nitz/foo.bar/acme.Widget.Part"
    );
}

#[test]
fn test_wrong_kind_names_the_url() {
    let registry = TypeRegistry::new();
    registry.pool().add_file(widget_file()).unwrap();
    let widget = registry.pool().get_message_by_name("acme.Widget").unwrap();
    registry.add_message("foo.bar/acme.Widget", &widget).unwrap();

    match registry.find_enum_by_url("foo.bar/acme.Widget").unwrap_err() {
        ReflectError::UnexpectedKind { url, expected, found } => {
            assert!(url.contains("acme.Widget"));
            assert_eq!(expected, DescriptorKind::Enum);
            assert_eq!(found, DescriptorKind::Message);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_descriptors_from_other_pools_are_imported() {
    let registry = TypeRegistry::new();
    let foreign = proto_descriptors::DescriptorPool::new();
    foreign.add_file(widget_file()).unwrap();
    let widget = foreign.get_message_by_name("acme.Widget").unwrap();

    registry.add_message("foo.bar/acme.Widget", &widget).unwrap();
    let found = registry.find_message_by_url("foo.bar/acme.Widget").unwrap().unwrap();
    assert!(found.pool().ptr_eq(registry.pool()));
    assert_ne!(found, widget);
    assert_eq!(found.fields().len(), 3);
    assert!(registry.pool().get_file_by_name("acme/widget.proto").is_some());
}

#[test]
fn test_unknown_url_without_fetcher_is_none() {
    let registry = TypeRegistry::new();
    assert!(registry.find_message_by_url("foo.bar/some.Type").unwrap().is_none());
    assert!(registry.find_enum_by_url("foo.bar/some.Enum").unwrap().is_none());
}

#[test]
fn test_well_known_types_resolve_without_defaults() {
    let registry = TypeRegistry::new();
    let duration = registry
        .find_message_by_url("type.googleapis.com/google.protobuf.Duration")
        .unwrap()
        .unwrap();
    assert_eq!(duration.file().name(), "google/protobuf/duration.proto");
    assert!(duration.pool().ptr_eq(registry.pool()));
}

#[test]
fn test_defaults_resolve_any_domain() {
    let registry = TypeRegistry::with_defaults();
    let m = registry
        .find_message_by_url("whatever.com/google.protobuf.Timestamp")
        .unwrap()
        .unwrap();
    assert_eq!(m.full_name(), "google.protobuf.Timestamp");
    let e = registry
        .find_enum_by_url("x/google.protobuf.FieldOptions.CType")
        .unwrap()
        .unwrap();
    assert_eq!(e.values().len(), 3);

    let from_config = TypeRegistry::from_config(RegistryConfig {
        include_defaults: true,
        ..RegistryConfig::default()
    });
    assert!(from_config
        .find_message_by_url("a.b/google.protobuf.Empty")
        .unwrap()
        .is_some());
}

// =============================================================================
// Synthesis
// =============================================================================

#[test]
fn test_find_message_with_fetcher() {
    let registry = fetching_registry();
    let md = registry.find_message_by_url("foo.bar/some.Type").unwrap().unwrap();

    assert_eq!(md.name(), "Type");
    assert_eq!(md.full_name(), "some.Type");
    assert_eq!(md.file().name(), "foo.proto");
    assert_eq!(md.file().package(), "some");
    assert_eq!(md.file().syntax(), Syntax::Proto3);

    let options = md.options();
    assert!(options.is_deprecated());
    assert_eq!(options.get_extension("testprotos.mfubar"), Some(&Value::Bool(true)));

    let fields = md.fields();
    assert_eq!(fields.len(), 4);

    assert_eq!(fields[0].name(), "a");
    assert_eq!(fields[0].number(), 1);
    assert_eq!(fields[0].label(), Label::Optional);
    assert!(fields[0].containing_oneof().is_none());
    let field_options = fields[0].options();
    assert!(field_options.is_deprecated());
    assert_eq!(
        field_options.get_extension("testprotos.ffubar"),
        Some(&Value::List(vec![
            Value::String("foo".into()),
            Value::String("bar".into()),
            Value::String("baz".into()),
        ]))
    );
    assert_eq!(
        field_options.get_extension("testprotos.ffubarb"),
        Some(&Value::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]))
    );

    assert_eq!(fields[1].name(), "b");
    assert_eq!(fields[1].label(), Label::Repeated);
    assert_eq!(fields[1].kind(), Kind::Scalar(ScalarType::String));

    assert_eq!(fields[2].name(), "c");
    assert_eq!(fields[2].containing_oneof().unwrap().name(), "un");
    assert!(matches!(fields[2].kind(), Kind::Enum(_)));

    assert_eq!(fields[3].name(), "d");
    assert_eq!(fields[3].containing_oneof().unwrap().name(), "un");
    assert_eq!(fields[3].kind(), Kind::Scalar(ScalarType::Int32));

    let oneofs = md.oneofs();
    assert_eq!(oneofs.len(), 1);
    assert_eq!(oneofs[0].fields(), vec![fields[2].clone(), fields[3].clone()]);

    // linked types
    let other = message_type(fields[0].kind());
    assert_eq!(other.full_name(), "some.OtherType");
    assert_eq!(other.file().name(), "bar.proto");
    assert_eq!(other.file().package(), "some");
    assert_eq!(other.file().syntax(), Syntax::Proto2);

    let nested = other.nested_messages();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].full_name(), "some.OtherType.AnotherType");
    assert_eq!(message_type(other.get_field_by_name("a").unwrap().kind()), nested[0]);
    assert_eq!(nested[0].file(), other.file());

    let en = match fields[2].kind() {
        Kind::Enum(e) => e,
        other => panic!("expected an enum, got {:?}", other),
    };
    assert_eq!(en.full_name(), "some.Enum");
    assert_eq!(en.file(), md.file());

    let deps: Vec<String> = md.file().dependencies().iter().map(|f| f.name().to_string()).collect();
    assert!(deps.contains(&"bar.proto".to_string()));
    assert!(deps.contains(&"testprotos/options.proto".to_string()));

    // a lone type in its own file takes its enclosing name as the package
    let md3 = registry
        .find_message_by_url("foo.bar/some.YetAnother.MessageType")
        .unwrap()
        .unwrap();
    assert_eq!(md3.name(), "MessageType");
    assert_eq!(md3.file().package(), "some.YetAnother");
    assert_eq!(md3.file().syntax(), Syntax::Proto2);
}

#[test]
fn test_find_enum_with_fetcher() {
    let registry = fetching_registry();
    let ed = registry.find_enum_by_url("foo.bar/some.Enum").unwrap().unwrap();

    assert_eq!(ed.full_name(), "some.Enum");
    assert_eq!(ed.file().package(), "some");
    assert_eq!(ed.file().syntax(), Syntax::Proto3);

    let options = ed.options();
    assert!(options.is_deprecated());
    assert_eq!(options.get("allow_alias"), Some(&Value::Bool(true)));
    for name in ["efubar", "efubars", "efubarsf"] {
        assert_eq!(
            options.get_extension(&format!("testprotos.{}", name)),
            Some(&Value::I32(-42))
        );
    }
    for name in ["efubaru", "efubaruf"] {
        assert_eq!(
            options.get_extension(&format!("testprotos.{}", name)),
            Some(&Value::U32(42))
        );
    }

    let values = ed.values();
    assert_eq!(values.len(), 3);
    assert_eq!((values[0].name(), values[0].number()), ("ABC", 0));
    assert_eq!((values[1].name(), values[1].number()), ("XYZ", 1));
    assert_eq!((values[2].name(), values[2].number()), ("WXY", 1));

    let value_options = values[0].options();
    assert!(value_options.is_deprecated());
    assert_eq!(
        value_options.get_extension("testprotos.evfubarsf"),
        Some(&Value::I64(-420420420420))
    );
    assert_eq!(
        value_options.get_extension("testprotos.evfubaruf"),
        Some(&Value::U64(420420420420))
    );
}

#[test]
fn test_fetched_types_are_cached() {
    let registry = fetching_registry();
    let first = registry.find_message_by_url("foo.bar/some.Type").unwrap().unwrap();
    let again = registry.find_message_by_url("https://foo.bar/some.Type").unwrap().unwrap();
    assert_eq!(first, again);

    // a referenced type is shared with direct lookups
    let other = registry.find_message_by_url("foo.bar/some.OtherType").unwrap().unwrap();
    assert_eq!(message_type(first.get_field_by_name("a").unwrap().kind()), other);

    match registry.find_enum_by_url("foo.bar/some.Type").unwrap_err() {
        ReflectError::UnexpectedKind { found, .. } => assert_eq!(found, DescriptorKind::Message),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_fetcher_errors_are_wrapped() {
    let registry = fetching_registry();
    match registry.find_enum_by_url("foo.bar/some.OtherType").unwrap_err() {
        ReflectError::Fetch { url, source } => {
            assert_eq!(url, "https://foo.bar/some.OtherType");
            assert!(source.to_string().contains("bad type"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(registry.find_message_by_url("foo.bar/no.Such").unwrap().is_none());
}

#[test]
fn test_mixed_well_known_references() {
    let bar = FlatDescription::from_json(include_str!("fixtures/mixed_bar.json")).unwrap();
    let registry = TypeRegistry::new().with_fetcher(
        move |url: &str, want_enum: bool| -> anyhow::Result<Option<FlatDescription>> {
            if url == "https://foo.test.com/foo.Bar" && !want_enum {
                Ok(Some(bar.clone()))
            } else {
                Err(anyhow::anyhow!("unknown type: {}", url))
            }
        },
    );

    let md = registry.find_message_by_url("foo.test.com/foo.Bar").unwrap().unwrap();
    assert_eq!(md.full_name(), "foo.Bar");
    assert_eq!(md.file().name(), "test/foo.proto");
    assert_eq!(md.file().package(), "foo");

    let created = message_type(md.get_field_by_name("created").unwrap().kind());
    assert_eq!(created.full_name(), "google.protobuf.Timestamp");
    assert_eq!(created.file().name(), "google/protobuf/timestamp.proto");
    assert_eq!(
        message_type(md.get_field_by_name("updated").unwrap().kind()),
        created
    );

    let oneof = &md.oneofs()[0];
    let choices = oneof.fields();
    assert_eq!(choices.len(), 3);
    let empty = message_type(choices[2].kind());
    assert_eq!(empty.full_name(), "google.protobuf.Empty");
    assert_eq!(empty.file().name(), "google/protobuf/empty.proto");
}

#[test]
fn test_mutually_recursive_types() {
    let node = FlatType::new("graph.Node")
        .with_field(FlatField::reference(
            "next",
            1,
            FlatKind::Message,
            "g.test/graph.Node",
        ))
        .with_field(FlatField::reference(
            "peer",
            2,
            FlatKind::Message,
            "g.test/graph.Peer",
        ));
    let peer = FlatType::new("graph.Peer").with_field(
        FlatField::reference(
            "back",
            1,
            FlatKind::Message,
            "g.test/graph.Node",
        )
        .repeated(),
    );
    let mut types: HashMap<String, FlatDescription> = HashMap::new();
    types.insert("https://g.test/graph.Node".into(), node.into());
    types.insert("https://g.test/graph.Peer".into(), peer.into());

    let registry = TypeRegistry::new().with_fetcher(fetcher(types));
    let node = registry.find_message_by_url("g.test/graph.Node").unwrap().unwrap();
    let peer = message_type(node.get_field_by_name("peer").unwrap().kind());

    assert_eq!(message_type(node.get_field_by_name("next").unwrap().kind()), node);
    assert_eq!(message_type(peer.get_field_by_name("back").unwrap().kind()), node);
    assert_eq!(node.file().name(), "graph/Node.proto");
    assert_eq!(peer.file().name(), "graph/Peer.proto");
    assert_eq!(node.file().package(), "graph");
}

#[test]
fn test_missing_reference_is_type_not_found() {
    let broken = FlatType::new("x.Broken").with_field(
        FlatField::reference("gone", 1, FlatKind::Message, "x.test/x.Gone"),
    );
    let mut types: HashMap<String, FlatDescription> = HashMap::new();
    types.insert("https://x.test/x.Broken".into(), broken.into());

    let registry = TypeRegistry::new().with_fetcher(fetcher(types));
    match registry.find_message_by_url("x.test/x.Broken").unwrap_err() {
        ReflectError::TypeNotFound(url) => assert_eq!(url, "x.test/x.Gone"),
        other => panic!("unexpected error {:?}", other),
    }
    // nothing was published
    assert!(registry.pool().get_message_by_name("x.Broken").is_none());
}

#[test]
fn test_unknown_options_retained_or_dropped() {
    let flat = FlatType::new("u.Thing")
        .with_field(FlatField::new("id", 1, FlatKind::Int32))
        .with_option(opt("acme.unheard_of", Value::Bool(true)));
    let mut types: HashMap<String, FlatDescription> = HashMap::new();
    types.insert("https://u.test/u.Thing".into(), flat.into());

    let keeping = TypeRegistry::new().with_fetcher(fetcher(types.clone()));
    let md = keeping.find_message_by_url("u.test/u.Thing").unwrap().unwrap();
    assert!(md.options().entries().is_empty());
    assert_eq!(md.options().unknown().len(), 1);
    assert_eq!(md.options().unknown()[0].name, "acme.unheard_of");

    let dropping = TypeRegistry::from_config(RegistryConfig {
        retain_unknown_options: false,
        ..RegistryConfig::default()
    })
    .with_fetcher(fetcher(types));
    let md = dropping.find_message_by_url("u.test/u.Thing").unwrap().unwrap();
    assert!(md.options().is_empty());
}

#[test]
fn test_undecodable_option_is_malformed() {
    let flat = FlatType::new("m.Bad").with_option(opt("deprecated", Value::String("yes".into())));
    let mut types: HashMap<String, FlatDescription> = HashMap::new();
    types.insert("https://m.test/m.Bad".into(), flat.into());

    let registry = TypeRegistry::new().with_fetcher(fetcher(types));
    match registry.find_message_by_url("m.test/m.Bad").unwrap_err() {
        ReflectError::Malformed { element, .. } => {
            assert!(element.contains("deprecated"));
            assert!(element.contains("m.Bad"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_concurrent_lookups_fetch_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let types = {
        let mut types: HashMap<String, FlatDescription> = HashMap::new();
        let root = FlatType::new("c.Root").with_field(
            FlatField::reference("leaf", 1, FlatKind::Message, "c.test/c.Leaf"),
        );
        types.insert("https://c.test/c.Root".into(), root.into());
        types.insert("https://c.test/c.Leaf".into(), FlatType::new("c.Leaf").into());
        types
    };
    let counter = calls.clone();
    let registry = Arc::new(TypeRegistry::new().with_fetcher(
        move |url: &str, _want_enum: bool| -> anyhow::Result<Option<FlatDescription>> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(types.get(url).cloned())
        },
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.find_message_by_url("c.test/c.Root").unwrap().unwrap())
        })
        .collect();
    let found: Vec<MessageDescriptor> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // c.Root, c.Leaf and one probe of the scope `c`
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(found.iter().all(|m| *m == found[0]));
}

#[test]
fn test_nested_type_before_its_parent() {
    let registry = fetching_registry();
    let nested = registry
        .find_message_by_url("foo.bar/some.OtherType.AnotherType")
        .unwrap()
        .unwrap();
    let parent = nested.parent_message().unwrap();
    assert_eq!(parent.full_name(), "some.OtherType");
    assert_eq!(nested.file().name(), "bar.proto");
    assert_eq!(nested.file().package(), "some");

    let md = registry.find_message_by_url("foo.bar/some.Type").unwrap().unwrap();
    let other = message_type(md.get_field_by_name("a").unwrap().kind());
    assert_eq!(other, parent);
    assert_eq!(other.nested_messages(), vec![nested.clone()]);

    // same layout as resolving the outer type first
    let forward = fetching_registry();
    let md = forward.find_message_by_url("foo.bar/some.Type").unwrap().unwrap();
    let forward_nested = forward
        .find_message_by_url("foo.bar/some.OtherType.AnotherType")
        .unwrap()
        .unwrap();
    assert_eq!(forward_nested.file().name(), nested.file().name());
    assert_eq!(forward_nested.file().package(), nested.file().package());
    assert_eq!(md.file().name(), "foo.proto");
}

#[test]
fn test_scope_probe_errors_are_not_fatal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let inner = FlatType::new("p.Outer.Inner").with_field(FlatField::new("id", 1, FlatKind::Int32));
    let registry = TypeRegistry::new().with_fetcher(
        move |url: &str, _want_enum: bool| -> anyhow::Result<Option<FlatDescription>> {
            counter.fetch_add(1, Ordering::SeqCst);
            match url {
                "https://p.test/p.Outer.Inner" => Ok(Some(inner.clone().into())),
                _ => Err(anyhow::anyhow!("unknown type: {}", url)),
            }
        },
    );

    let md = registry.find_message_by_url("p.test/p.Outer.Inner").unwrap().unwrap();
    assert!(md.parent_message().is_none());
    assert_eq!(md.file().package(), "p.Outer");
    assert!(registry.find_message_by_url("p.test/p.Outer.Inner").unwrap().is_some());
    // one fetch of the type, one failed probe of p.Outer
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Services
// =============================================================================

fn api() -> FlatApi {
    let mut api = FlatApi::from_json(include_str!("fixtures/some_service.json")).unwrap();
    let pool = proto_descriptors::DescriptorPool::new();
    pool.add_file(testprotos()).unwrap();
    let mut simple = DynamicMessage::new(pool.get_message_by_name("testprotos.ReallySimpleMessage").unwrap());
    simple.set_field_by_name("id", Value::U64(100)).unwrap();
    simple.set_field_by_name("name", Value::String("deuce".into())).unwrap();

    api.options = vec![
        opt("deprecated", Value::Bool(true)),
        opt("testprotos.sfubar", Value::Message(simple)),
        opt("testprotos.sfubare", Value::EnumNumber(1)),
    ];
    api.methods[0].options = vec![
        opt("deprecated", Value::Bool(true)),
        opt("testprotos.mtfubar", Value::F32(1.5)),
        opt("testprotos.mtfubar", Value::F32(2.25)),
        opt("testprotos.mtfubard", Value::F64(10203040.506070809)),
    ];
    api
}

#[test]
fn test_resolve_api_to_service() {
    let registry = fetching_registry();
    let sd = registry.resolve_api_to_service(&api()).unwrap();

    assert_eq!(sd.name(), "Service");
    assert_eq!(sd.full_name(), "some.Service");
    assert_eq!(sd.file().package(), "some");
    assert_eq!(sd.file().syntax(), Syntax::Proto3);

    let options = sd.options();
    assert!(options.is_deprecated());
    let simple = options
        .get_extension("testprotos.sfubar")
        .and_then(Value::as_message)
        .unwrap();
    assert_eq!(simple.get_field_by_name("id"), Some(&Value::U64(100)));
    assert_eq!(simple.get_field_by_name("name"), Some(&Value::String("deuce".into())));
    assert_eq!(options.get_extension("testprotos.sfubare"), Some(&Value::EnumNumber(1)));

    let methods = sd.methods();
    assert_eq!(methods.len(), 4);
    assert_eq!(methods[0].name(), "UnaryMethod");
    assert_eq!(methods[0].input().full_name(), "some.Type");
    assert_eq!(methods[0].output().full_name(), "some.OtherType");
    assert!(!methods[0].is_client_streaming() && !methods[0].is_server_streaming());
    let method_options = methods[0].options();
    assert!(method_options.is_deprecated());
    assert_eq!(
        method_options.get_extension("testprotos.mtfubar"),
        Some(&Value::List(vec![Value::F32(1.5), Value::F32(2.25)]))
    );
    assert_eq!(
        method_options.get_extension("testprotos.mtfubard"),
        Some(&Value::F64(10203040.506070809))
    );

    assert_eq!(methods[1].name(), "ClientStreamMethod");
    assert!(methods[1].is_client_streaming() && !methods[1].is_server_streaming());
    assert_eq!(methods[2].name(), "ServerStreamMethod");
    assert!(!methods[2].is_client_streaming() && methods[2].is_server_streaming());
    assert_eq!(methods[3].name(), "BidiStreamMethod");
    assert!(methods[3].is_client_streaming() && methods[3].is_server_streaming());

    // shared nodes
    assert_eq!(methods[0].input(), methods[1].output());
    assert_eq!(methods[0].output(), methods[1].input());
    assert_eq!(methods[2].input(), methods[3].output());
    assert_eq!(methods[2].output(), methods[3].input());

    let md1 = methods[0].input();
    assert_eq!(md1.file().syntax(), Syntax::Proto3);
    let md2 = methods[0].output();
    assert_eq!(md2.file().syntax(), Syntax::Proto2);
    let md3 = methods[2].input();
    assert_eq!(md3, md2.nested_messages()[0]);
    assert_eq!(md3.full_name(), "some.OtherType.AnotherType");

    // declared alongside the service, so the service file decides package and syntax
    let md4 = methods[2].output();
    assert_eq!(md4.full_name(), "some.YetAnother.MessageType");
    assert_eq!(md4.file(), sd.file());
    assert_eq!(md4.file().package(), "some");
    assert_eq!(md4.file().syntax(), Syntax::Proto3);

    let again = registry.resolve_api_to_service(&api()).unwrap();
    assert_eq!(again, sd);
}

#[test]
fn test_concurrent_api_resolution_links_one_service() {
    let registry = Arc::new(fetching_registry());
    let api = Arc::new(api());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let api = api.clone();
            thread::spawn(move || registry.resolve_api_to_service(&api).unwrap())
        })
        .collect();
    let services: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(services.iter().all(|s| *s == services[0]));
    assert_eq!(services[0].full_name(), "some.Service");
    assert!(registry.pool().get_file_by_name("baz_1.proto").is_none());
}

#[test]
fn test_descriptor_to_flat_metadata() {
    let registry = fetching_registry();
    let md = registry.find_message_by_url("foo.bar/some.Type").unwrap().unwrap();

    let flat = registry.message_as_flat(&md).unwrap();
    assert_eq!(flat.name, "some.Type");
    assert_eq!(flat.oneofs, vec!["un".to_string()]);
    assert_eq!(flat.source_file.as_deref(), Some("foo.proto"));
    assert_eq!(flat.syntax, Syntax::Proto3);
    assert_eq!(flat.fields[0].type_url, "type.googleapis.com/some.OtherType");
    assert_eq!(flat.fields[2].kind, FlatKind::Enum);
    assert_eq!(flat.fields[2].oneof_index, 1);
    let repeated: Vec<&FlatOption> = flat.fields[0]
        .options
        .iter()
        .filter(|o| o.name == "testprotos.ffubar")
        .collect();
    assert_eq!(repeated.len(), 3);

    let ed = registry.find_enum_by_url("foo.bar/some.Enum").unwrap().unwrap();
    let flat_enum = registry.enum_as_flat(&ed).unwrap();
    assert_eq!(flat_enum.values.len(), 3);
    assert!(flat_enum.options.iter().any(|o| o.name == "allow_alias"));
}

// =============================================================================
// Any envelopes
// =============================================================================

fn duration() -> Generated<wellknown::Duration> {
    let descriptor = wellknown::pool()
        .get_message_by_name("google.protobuf.Duration")
        .unwrap();
    Generated::new(wellknown::Duration { seconds: 42, nanos: 7 }, descriptor)
}

#[test]
fn test_marshal_and_unmarshal_any() {
    let registry = TypeRegistry::with_defaults();
    let any = registry.marshal_any(&duration());
    assert_eq!(any.type_url, "type.googleapis.com/google.protobuf.Duration");

    let decoded = registry.unmarshal_any(&any).unwrap();
    let concrete = decoded
        .downcast_ref::<Generated<wellknown::Duration>>()
        .unwrap();
    assert_eq!(concrete.get(), duration().get());

    // a registry that only knows the descriptor decodes dynamically
    let plain = TypeRegistry::new();
    plain.pool().add_file(widget_file()).unwrap();
    let widget = plain.pool().get_message_by_name("acme.Widget").unwrap();
    plain.add_message("type.googleapis.com/acme.Widget", &widget).unwrap();

    let mut message = DynamicMessage::new(widget);
    message.set_field_by_name("id", Value::U64(9)).unwrap();
    message.set_field_by_name("name", Value::String("sprocket".into())).unwrap();
    let any = plain.marshal_any(&message);
    assert!(any.type_url.ends_with("/acme.Widget"));

    let decoded = plain.unmarshal_any(&any).unwrap();
    let dynamic = decoded.downcast_ref::<DynamicMessage>().unwrap();
    assert_eq!(dynamic, &message);

    let unknown = AnyEnvelope::new("type.googleapis.com/acme.Unknown", Vec::new());
    assert!(matches!(
        plain.unmarshal_any(&unknown),
        Err(ReflectError::TypeNotFound(_))
    ));
}

#[test]
fn test_base_url_overrides() {
    let registry = TypeRegistry::with_defaults();
    let message = duration();

    registry.set_default_base_url("foo.com/some/path/");
    assert_eq!(
        registry.marshal_any(&message).type_url,
        "foo.com/some/path/google.protobuf.Duration"
    );

    registry.add_base_url_for_element("bar.com/other/", "google.protobuf");
    assert_eq!(
        registry.marshal_any(&message).type_url,
        "bar.com/other/google.protobuf.Duration"
    );

    registry.add_base_url_for_element("http://baz.com/another/", "google.protobuf.Duration");
    assert_eq!(
        registry.marshal_any(&message).type_url,
        "http://baz.com/another/google.protobuf.Duration"
    );

    // other types in the package keep the package override
    let timestamp = registry
        .find_message_by_url("x/google.protobuf.Timestamp")
        .unwrap()
        .unwrap();
    assert_eq!(
        registry.compute_url(&timestamp.into()),
        "bar.com/other/google.protobuf.Timestamp"
    );

    // an empty default restores the configured one
    let plain = TypeRegistry::new();
    plain.set_default_base_url("foo.com/");
    plain.set_default_base_url("");
    assert_eq!(
        plain.marshal_any(&message).type_url,
        "type.googleapis.com/google.protobuf.Duration"
    );
}

#[test]
#[should_panic(expected = "must not be empty")]
fn test_empty_element_name_panics() {
    TypeRegistry::new().add_base_url_for_element("foo.com/", "");
}
