use pretty_assertions::assert_eq;
use strata_core::{
    BitStream, Builder, Error, FieldSet, FormatDescriptor, FormatRegistry, Grammar, Magic,
    ParseOptions, Result, Step,
};
use tracing_test::traced_test;

struct Tagged;

impl Grammar for Tagged {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_raw("magic", 4)?;
        cx.add_uint("version", 8)?;
        Ok(Step::Done)
    }
}

fn parse_tagged(stream: BitStream, _options: &ParseOptions) -> Result<FieldSet> {
    Ok(FieldSet::root(stream, Tagged))
}

fn version_one(stream: &BitStream) -> core::result::Result<(), String> {
    match stream.read_bytes(4, 1) {
        Ok([1]) => Ok(()),
        Ok(other) => Err(format!("unsupported version {other:?}")),
        Err(err) => Err(err.to_string()),
    }
}

fn anything(_: &BitStream) -> core::result::Result<(), String> {
    Ok(())
}

const TAGGED: FormatDescriptor = FormatDescriptor {
    id: "tagged",
    category: "misc",
    description: "Tagged test format",
    extensions: &["tag"],
    mime: &[],
    magic: &[Magic {
        pattern: b"TAG!",
        bit_offset: 0,
    }],
    min_size_bits: 5 * 8,
    validate: version_one,
    parse: parse_tagged,
};

const CATCH_ALL: FormatDescriptor = FormatDescriptor {
    id: "catch_all",
    category: "misc",
    description: "Accepts anything",
    extensions: &[],
    mime: &[],
    magic: &[],
    min_size_bits: 0,
    validate: anything,
    parse: parse_tagged,
};

#[traced_test]
#[test]
fn detects_by_magic_and_validator() -> Result<()> {
    let registry = FormatRegistry::new().with(TAGGED);

    let stream = BitStream::new(b"TAG!\x01".to_vec());
    let (format, mut root) = registry.parse(stream, &ParseOptions::default())?;
    assert_eq!(format.id, "tagged");
    assert_eq!(root.uint("version")?, 1);

    let wrong_version = BitStream::new(b"TAG!\x02".to_vec());
    assert!(registry.detect(&wrong_version).is_none());
    assert!(logs_contain("unsupported version"));

    let too_small = BitStream::new(b"TAG!".to_vec());
    assert!(matches!(
        registry.parse(too_small, &ParseOptions::default()),
        Err(Error::UnknownFormat)
    ));
    Ok(())
}

#[traced_test]
#[test]
fn earlier_registrations_win() {
    let registry = FormatRegistry::new().with(TAGGED).with(CATCH_ALL);
    let stream = BitStream::new(b"TAG!\x01".to_vec());
    assert_eq!(registry.detect(&stream).map(|f| f.id), Some("tagged"));

    let other = BitStream::new(b"nothing".to_vec());
    assert_eq!(registry.detect(&other).map(|f| f.id), Some("catch_all"));

    let verdicts = registry.explain(&other);
    assert_eq!(verdicts.len(), 2);
    assert!(verdicts[0].1.is_err());
    assert!(verdicts[1].1.is_ok());
}

#[test]
fn extensions() {
    assert!(TAGGED.matches_extension("archive.TAG"));
    assert!(!TAGGED.matches_extension("archive.rar"));
    assert!(!TAGGED.matches_extension("tag"));
}
