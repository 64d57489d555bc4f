use crystal_slab_generator::io::writer::save_metadata;
use crystal_slab_generator::{
    generate_slabs, load_config, slabs_to_file, Crystal, GenerationConfig, Lattice, MillerSpec,
    OutputFormat, OxidationSpec, SaveOptions, Site,
};
use nalgebra::{Matrix3, Vector3};

/// Conventional rocksalt MgO cell, a = 4.212 A.
fn mgo_bulk() -> Crystal {
    let lattice = Lattice::new(Matrix3::identity() * 4.212).unwrap();
    let mg = [
        [0.0, 0.0, 0.0],
        [0.5, 0.5, 0.0],
        [0.5, 0.0, 0.5],
        [0.0, 0.5, 0.5],
    ];
    let o = [
        [0.5, 0.0, 0.0],
        [0.0, 0.5, 0.0],
        [0.0, 0.0, 0.5],
        [0.5, 0.5, 0.5],
    ];
    let mut sites = Vec::new();
    for c in mg {
        sites.push(Site::new("Mg", Vector3::new(c[0], c[1], c[2])));
    }
    for c in o {
        sites.push(Site::new("O", Vector3::new(c[0], c[1], c[2])));
    }
    Crystal::new(lattice, sites).unwrap()
}

fn base_config() -> GenerationConfig {
    GenerationConfig {
        miller: MillerSpec::Single([0, 0, 1]),
        thicknesses: vec![10.0],
        vacuums: vec![10.0],
        center_slab: true,
        ox_states: OxidationSpec::Guess,
        is_symmetric: true,
        layers_to_relax: None,
        max_size: 500,
        ftol: 0.1,
        processes: Some(1),
    }
}

#[test]
fn mgo_001_slab_generation() {
    let bulk = mgo_bulk();
    let slabs = generate_slabs(&bulk, &base_config()).expect("generation failed");
    assert!(!slabs.is_empty(), "no slabs for MgO (001)");

    for slab in &slabs {
        assert_eq!(slab.hkl, [0, 0, 1]);
        assert_eq!(slab.slab_thickness, 10.0);
        assert_eq!(slab.vacuum_thickness, 10.0);
        assert!(!slab.structure.sites.is_empty());

        // Guessed oxidation states carry through from the bulk.
        assert!(slab.structure.sites.iter().all(|s| {
            let expected = if s.element == "Mg" { 2.0 } else { -2.0 };
            s.oxidation_state == Some(expected)
        }));

        // The cell holds at least the requested slab plus vacuum.
        let (_, _, c, ..) = slab.structure.lattice.to_parameters();
        assert!(c >= 20.0, "cell height {} too small", c);

        // Rocksalt (001) layers are neutral, so the slab must be
        // stoichiometric.
        let comp = slab.structure.composition();
        assert_eq!(comp["Mg"], comp["O"]);
    }
}

#[test]
fn max_index_sweep_covers_distinct_orientations() {
    let bulk = mgo_bulk();
    let config = GenerationConfig {
        miller: MillerSpec::MaxIndex(1),
        is_symmetric: false,
        ..base_config()
    };
    let slabs = generate_slabs(&bulk, &config).expect("generation failed");

    let mut orientations: Vec<[i32; 3]> = slabs.iter().map(|s| s.hkl).collect();
    orientations.sort_unstable();
    orientations.dedup();
    // Symmetry reduction of a cubic cell leaves {100}, {110}, {111}.
    assert!(orientations.len() <= 3);
    for hkl in &orientations {
        assert!(
            [[1, 0, 0], [1, 1, 0], [1, 1, 1]].contains(hkl),
            "unexpected orientation {:?}",
            hkl
        );
    }
    // The neutral (100) cut always survives the dipole filter.
    assert!(orientations.contains(&[1, 0, 0]));
}

#[test]
fn folder_layout_with_input_files() {
    let bulk = mgo_bulk();
    let slabs = generate_slabs(&bulk, &base_config()).expect("generation failed");

    let dir = tempfile::tempdir().unwrap();
    let opts = SaveOptions {
        root: dir.path().to_path_buf(),
        make_fols: true,
        make_input_files: true,
        fmt: OutputFormat::Poscar,
        name: "POSCAR".to_string(),
        config: load_config(None).unwrap(),
    };
    slabs_to_file(&slabs, "MgO", &opts).expect("saving failed");

    for slab in &slabs {
        let folder = dir
            .path()
            .join(slab.hkl_string())
            .join(format!("{}_{}_{}", 10, 10, slab.slab_index));
        for file in ["POSCAR", "INCAR", "KPOINTS", "POTCAR.spec"] {
            assert!(folder.join(file).exists(), "missing {:?}", folder.join(file));
        }
    }
}

#[test]
fn flat_layout_and_metadata() {
    let bulk = mgo_bulk();
    let slabs = generate_slabs(&bulk, &base_config()).expect("generation failed");

    let dir = tempfile::tempdir().unwrap();
    let opts = SaveOptions {
        root: dir.path().to_path_buf(),
        make_fols: false,
        make_input_files: false,
        fmt: OutputFormat::Poscar,
        name: "POSCAR".to_string(),
        config: load_config(None).unwrap(),
    };
    slabs_to_file(&slabs, "MgO", &opts).expect("saving failed");

    let formula_dir = dir.path().join("MgO");
    for slab in &slabs {
        let file = formula_dir.join(format!("POSCAR_{}", slab.label()));
        assert!(file.exists(), "missing {:?}", file);
    }

    let path = save_metadata(&slabs, "MgO", dir.path(), None).expect("metadata failed");
    assert_eq!(path.file_name().unwrap(), "MgO_metadata.json");
    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entries = parsed.as_array().unwrap();
    assert_eq!(entries.len(), slabs.len());
    assert!(entries[0].get("hkl").is_some());
    assert!(entries[0].get("shift").is_some());
}

#[test]
fn selective_dynamics_marks_surface_layers() {
    let bulk = mgo_bulk();
    let config = GenerationConfig {
        layers_to_relax: Some(1),
        ..base_config()
    };
    let slabs = generate_slabs(&bulk, &config).expect("generation failed");

    for slab in &slabs {
        let flags: Vec<[bool; 3]> = slab
            .structure
            .sites
            .iter()
            .filter_map(|s| s.selective_dynamics)
            .collect();
        assert_eq!(flags.len(), slab.structure.sites.len());
        assert!(flags.contains(&[true, true, true]));
        assert!(flags.contains(&[false, false, false]));
    }
}
