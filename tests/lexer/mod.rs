// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use blueprint_lint::unstable::*;

#[test]
fn regions_of_a_multiline_template() {
    let text = "{% set t = states('sensor.t') | float(0) %}\n{# round for display #}\n{{ t | round(1) }} C";
    let kinds: Vec<RegionKind> = scan(text).map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RegionKind::Control,
            RegionKind::Literal,
            RegionKind::Comment,
            RegionKind::Literal,
            RegionKind::Expression,
            RegionKind::Literal,
        ]
    );

    let frags = fragments(text);
    assert_eq!(frags.len(), 2);
    assert!(frags[0].is_control());
    let idents: Vec<&str> = frags[1]
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Ident)
        .map(|t| t.text)
        .collect();
    assert_eq!(idents, vec!["t", "round"]);
}

#[test]
fn token_offsets_point_into_the_field() {
    let text = "on: {{ level / 2 }}";
    let frags = fragments(text);
    for tok in &frags[0].tokens {
        assert_eq!(&text[tok.offset..tok.offset + tok.text.len()], tok.text);
    }
}

#[test]
fn plain_strings_are_not_templated() {
    assert!(!is_templated("light.kitchen"));
    assert!(!is_templated("{ not: a template }"));
    assert!(!is_templated("{# comment only #}"));
    assert!(is_templated("{{ x }}"));
    assert!(is_templated("{%- if x -%}y{%- endif -%}"));
}

#[test]
fn source_lines() -> Result<()> {
    let source = Source::from_contents(
        "fan.yaml".to_string(),
        "variables:\n  a: \"{{ 1 }}\"\n  b: \"{{ a }}\"\n".to_string(),
    )?;
    let offset = source.contents().find("{{ a").unwrap_or_default();
    assert_eq!(source.position(offset), (3, 7));
    assert_eq!(source.line(2), "  b: \"{{ a }}\"");
    Ok(())
}
