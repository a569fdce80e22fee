use dmri_prep::interfaces::spec::{InterfaceSpec, MetaValue};
use dmri_prep::Gennlxfm;

fn assert_metadata(spec: &InterfaceSpec, expected: &[(&str, Vec<(&str, MetaValue)>)]) {
    for (field, metadata) in expected {
        let traits = spec
            .get(field)
            .unwrap_or_else(|| panic!("missing field '{}'", field));
        for (key, value) in metadata {
            assert_eq!(
                traits.metadata(key).as_ref(),
                Some(value),
                "metadata '{}' of '{}'",
                key,
                field
            );
        }
    }
}

#[test]
fn test_gennlxfm_inputs() {
    let input_map: Vec<(&str, Vec<(&str, MetaValue)>)> = vec![
        ("args", vec![("argstr", "%s".into())]),
        ("clobber", vec![("argstr", "-clobber".into()), ("usedefault", true.into())]),
        ("environ", vec![("nohash", true.into()), ("usedefault", true.into())]),
        ("ident", vec![("argstr", "-ident".into())]),
        ("ignore_exception", vec![("nohash", true.into()), ("usedefault", true.into())]),
        ("like", vec![("argstr", "-like %s".into())]),
        (
            "output_file",
            vec![
                ("argstr", "%s".into()),
                ("genfile", true.into()),
                ("hash_files", false.into()),
                ("name_source", vec!["like"].into()),
                ("name_template", "%s_gennlxfm.xfm".into()),
                ("position", MetaValue::Int(-1)),
            ],
        ),
        ("step", vec![("argstr", "-step %s".into())]),
        ("terminal_output", vec![("nohash", true.into())]),
        ("verbose", vec![("argstr", "-verbose".into())]),
    ];

    let inputs = Gennlxfm::input_spec();
    assert_metadata(&inputs, &input_map);
    assert_eq!(inputs.len(), input_map.len());
}

#[test]
fn test_gennlxfm_outputs() {
    let outputs = Gennlxfm::output_spec();
    let mut names = outputs.names();
    names.sort_unstable();
    assert_eq!(names, vec!["output_file", "output_grid"]);
}

#[test]
fn test_gennlxfm_undeclared_keys_are_absent() {
    let inputs = Gennlxfm::input_spec();
    let like = inputs.get("like").unwrap();
    assert_eq!(like.metadata("mandatory"), None);
    assert_eq!(like.metadata("position"), None);
    assert_eq!(inputs.get("terminal_output").unwrap().metadata("usedefault"), None);
}
