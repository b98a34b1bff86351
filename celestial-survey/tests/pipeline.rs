use celestial_survey::assemble::{CatalogAssembler, CLUSTERS_STEM, KEY_ID, KEY_ID_CL, MEMBERS_STEM};
use celestial_survey::config::SurveyConfig;
use celestial_survey::footprint::FootprintMap;
use celestial_survey::lookup::InterpolationTable;
use celestial_survey::mosaic::{shard_path, write_footprint_mosaic, MosaicIndex, ShardKind};
use celestial_survey::query::{Positions, RegionQuery};
use celestial_survey::table::{Column, ColumnarFile, Table, TableStore};
use celestial_survey::tiles::{read_tile_table, write_tile_table, SearchRadius, Target, TileGenerator};
use celestial_survey::PixelGrid;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tempfile::TempDir;

const CENTRE: (f64, f64) = (40.0, 10.0);

/// Footprint at nside 64 over a 12° disc, with a half-covered edge ring.
fn write_footprint(path: &Path) -> FootprintMap {
    let grid = PixelGrid::nest(64).unwrap();
    let pixels = grid.disc_pixels(CENTRE.0, CENTRE.1, 12.0, false);
    let (ra, dec) = grid.pixels_to_angles(&pixels).unwrap();
    let fractions: Vec<f64> = ra
        .iter()
        .zip(&dec)
        .map(|(&r, &d)| {
            if celestial_survey::grid::sphere::angular_distance_deg(r, d, CENTRE.0, CENTRE.1) > 11.0 {
                0.5
            } else {
                1.0
            }
        })
        .collect();
    let footprint = FootprintMap::new(grid, pixels, fractions).unwrap();
    ColumnarFile
        .write_table(&footprint.to_table("pixel", "frac").unwrap(), path, false)
        .unwrap();
    footprint
}

/// One object at the centre of every fifth footprint pixel, sharded at nside 16.
fn write_catalog(dir: &Path, footprint: &FootprintMap) -> usize {
    let shard_grid = PixelGrid::nest(16).unwrap();
    let fine = footprint.grid();
    let mut shards: BTreeMap<u64, Vec<(i64, f64, f64)>> = BTreeMap::new();
    let mut count = 0;
    for (i, &pixel) in footprint.pixels().iter().enumerate().step_by(5) {
        let (ra, dec) = fine.pix2ang(pixel).unwrap();
        shards
            .entry(shard_grid.ang2pix(ra, dec))
            .or_default()
            .push((i as i64, ra, dec));
        count += 1;
    }
    std::fs::create_dir_all(dir).unwrap();
    for (shard, rows) in shards {
        let table = Table::new()
            .with_column("objid", Column::Int(rows.iter().map(|r| r.0).collect()))
            .unwrap()
            .with_column("RA", Column::Float(rows.iter().map(|r| r.1).collect()))
            .unwrap()
            .with_column("DEC", Column::Float(rows.iter().map(|r| r.2).collect()))
            .unwrap()
            .with_column(
                "snr",
                Column::Float(rows.iter().map(|r| ((r.0 * 7919) % 1009) as f64 + r.0 as f64 * 1e-6).collect()),
            )
            .unwrap();
        let path = shard_path(dir, shard, ShardKind::Catalog, ColumnarFile::EXTENSION);
        ColumnarFile.write_table(&table, &path, false).unwrap();
    }
    count
}

fn survey_config(root: &Path, overlap_deg: f64) -> SurveyConfig {
    let json = serde_json::json!({
        "footprint": {
            "path": root.join("footprint.ctab"),
            "grid": { "nside": 64, "nest": true },
            "key_pixel": "pixel",
            "key_frac": "frac",
            "mosaic": {
                "dir": root.join("footprint_mosaic"),
                "grid": { "nside": 16, "nest": true }
            }
        },
        "catalog": {
            "key_ra": "RA",
            "key_dec": "DEC",
            "mosaic": {
                "dir": root.join("catalog_mosaic"),
                "grid": { "nside": 16, "nest": true }
            }
        },
        "tiling": {
            "grid": { "nside": 8, "nest": true },
            "overlap_deg": overlap_deg
        },
        "assembly": { "key_rank": "snr" },
        "workdir": root
    });
    SurveyConfig::from_json_str(&json.to_string()).unwrap()
}

#[test]
fn test_survey_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let store = ColumnarFile;

    let written = write_footprint(&root.join("footprint.ctab"));
    let objects = write_catalog(&root.join("catalog_mosaic"), &written);

    // Tile discs must reach every corner of their own pixel.
    let overlap = PixelGrid::nest(8).unwrap().max_pixel_radius_deg();
    let config = survey_config(root, overlap);

    // Footprint round trip and mosaic.
    let footprint = FootprintMap::load(&store, &config.footprint).unwrap();
    assert_eq!(footprint, written);
    let mosaic_cfg = config.footprint.mosaic.as_ref().unwrap();
    let footprint_index =
        write_footprint_mosaic(&store, &footprint, mosaic_cfg, "pixel", "frac", false).unwrap();
    let sharded = footprint_index.concatenate(&store).unwrap();
    assert_eq!(sharded.num_rows(), footprint.len());

    let query = RegionQuery::new(&store);
    let near = query
        .footprint_in_disc(&footprint_index, "pixel", *footprint.grid(), CENTRE.0, CENTRE.1, 3.0)
        .unwrap()
        .unwrap();
    assert!(near.floats("frac").unwrap().iter().all(|&f| f == 1.0));

    // Tiles.
    let generator = TileGenerator::new(config.tiling.clone()).unwrap();
    let tiles = generator.grid_tiles(&footprint).unwrap();
    assert!(tiles.len() > 1);
    let eff: f64 = tiles.iter().map(|t| t.eff_area_deg2).sum();
    assert!((eff - footprint.total_area_deg2()).abs() < 1e-6 * eff);

    let tile_path = root.join("tiles.ctab");
    write_tile_table(&store, &tiles, &tile_path, false).unwrap();
    let tiles = read_tile_table(&store, &tile_path).unwrap();

    // Per-tile extraction and a one-object-per-cluster "detection".
    let catalog_index = MosaicIndex::from_config(&config.catalog.mosaic, ShardKind::Catalog).unwrap();
    let empty = catalog_index.concatenate(&store).unwrap().take(&[]).unwrap();
    assert_eq!(catalog_index.concatenate(&store).unwrap().num_rows(), objects);

    let assembler = CatalogAssembler::new(&store, config.assembly.clone());
    let tiles_dir = root.join("tiles");
    let mut detections = 0;
    for tile in &tiles {
        let rows = query
            .catalog_in_disc(&catalog_index, "RA", "DEC", tile.ra, tile.dec, tile.radius_tile_deg)
            .unwrap()
            .unwrap_or_else(|| empty.clone());
        let n = rows.num_rows();
        detections += n;

        let index = Column::Int((0..n as i64).collect());
        let mut clusters = rows.clone();
        clusters.push_column("index_cl_tile", index.clone()).unwrap();
        clusters.push_column("nmem", Column::Int(vec![1; n])).unwrap();
        let members = Table::new()
            .with_column("index_cl_tile", index)
            .unwrap()
            .with_column("objid", rows.column("objid").unwrap().clone())
            .unwrap();

        std::fs::create_dir_all(celestial_survey::assemble::tile_dir(&tiles_dir, tile.id)).unwrap();
        store
            .write_table(&clusters, &assembler.tile_file(&tiles_dir, tile.id, CLUSTERS_STEM), false)
            .unwrap();
        store
            .write_table(&members, &assembler.tile_file(&tiles_dir, tile.id, MEMBERS_STEM), false)
            .unwrap();
    }
    assert!(detections > objects, "tiles overlap, so objects repeat");

    // Assembly keeps every object exactly once.
    let positions = Positions::Columns { ra: "RA", dec: "DEC" };
    let (clusters, members) = assembler.assemble(&tiles, &tiles_dir, &positions).unwrap();
    assert_eq!(clusters.num_rows(), objects);
    assert_eq!(members.num_rows(), objects);

    let mut objids = clusters.ints("objid").unwrap().to_vec();
    objids.sort_unstable();
    objids.dedup();
    assert_eq!(objids.len(), objects);

    let snr = clusters.floats("snr").unwrap();
    assert!(snr.windows(2).all(|w| w[0] >= w[1]));
    let ids = clusters.strs(KEY_ID).unwrap();
    assert!(ids.iter().enumerate().all(|(i, id)| *id == i.to_string()));

    let id_of: HashMap<i64, &String> = clusters
        .ints("objid")
        .unwrap()
        .iter()
        .copied()
        .zip(ids)
        .collect();
    for (objid, id_cl) in members
        .ints("objid")
        .unwrap()
        .iter()
        .zip(members.strs(KEY_ID_CL).unwrap())
    {
        assert_eq!(id_of[objid], id_cl);
    }

    store
        .write_table(&clusters, &root.join("survey_clusters.ctab"), false)
        .unwrap();
    let back = store.read_table(&root.join("survey_clusters.ctab")).unwrap();
    assert_eq!(back, clusters);
}

#[test]
fn test_target_tile_with_physical_radius() {
    let dir = TempDir::new().unwrap();
    let footprint = write_footprint(&dir.path().join("footprint.ctab"));
    let config = survey_config(dir.path(), 0.5);

    let lookup_path = dir.path().join("arcmin_per_mpc.txt");
    std::fs::write(&lookup_path, "# z conv\n0.1 0.0050\n0.5 0.0015\n").unwrap();
    let lookup = InterpolationTable::from_file(&lookup_path).unwrap();
    let conv_factor = lookup.interpolate(0.3);
    assert!((conv_factor - 0.00325).abs() < 1e-12);

    let target = Target {
        id: 7,
        ra: CENTRE.0,
        dec: CENTRE.1,
        tile_radius_deg: 1.0,
        search_radius: SearchRadius::Mpc {
            value: 1.0,
            conv_factor,
        },
    };
    let tile = TileGenerator::new(config.tiling)
        .unwrap()
        .target_tile(&target, &footprint)
        .unwrap();

    assert!(tile.is_target());
    assert_eq!(tile.id, 7);
    let expected = ((1.0 / 60.0) / conv_factor).to_degrees();
    assert!((tile.radius_filter_deg.unwrap() - expected).abs() < 1e-12);
    // Fully covered around the centre.
    assert_eq!(tile.coverfrac_5arcmin, Some(1.0));
    assert!((tile.eff_area_deg2 - tile.disc_eff_area_deg2).abs() < 1e-12);
}
