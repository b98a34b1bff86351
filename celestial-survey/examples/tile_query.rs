use celestial_survey::config::SurveyConfig;
use celestial_survey::footprint::FootprintMap;
use celestial_survey::mosaic::{MosaicIndex, ShardKind};
use celestial_survey::query::RegionQuery;
use celestial_survey::table::ColumnarFile;
use celestial_survey::tiles::TileGenerator;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("Usage: tile_query <survey.json> <ra> <dec>");
    let ra: f64 = args.next().expect("missing ra").parse()?;
    let dec: f64 = args.next().expect("missing dec").parse()?;

    let config = SurveyConfig::from_json_file(&path)?;
    let store = ColumnarFile;
    let footprint = FootprintMap::load(&store, &config.footprint)?;
    let generator = TileGenerator::new(config.tiling.clone())?;
    let tiles = generator.grid_tiles(&footprint)?;

    let hpix = generator.grid().ang2pix(ra, dec);
    let Some(tile) = tiles.iter().find(|t| t.hpix == Some(hpix)) else {
        println!("({ra:.3}, {dec:.3}) is outside the survey footprint");
        return Ok(());
    };
    println!(
        "tile {} centre ({:.4}, {:+.4}) radius {:.3}°  area {:.2} deg²  effective {:.2} deg²",
        tile.id, tile.ra, tile.dec, tile.radius_tile_deg, tile.area_deg2, tile.eff_area_deg2,
    );

    let catalog = &config.catalog;
    let index = MosaicIndex::from_config(&catalog.mosaic, ShardKind::Catalog)?;
    let rows = RegionQuery::new(&store).catalog_in_disc(
        &index,
        &catalog.key_ra,
        &catalog.key_dec,
        tile.ra,
        tile.dec,
        tile.radius_tile_deg,
    )?;
    match rows {
        Some(rows) => {
            println!("\n{} catalog rows in the tile disc:\n", rows.num_rows());
            let ra = rows.numeric_as_f64(&catalog.key_ra)?;
            let dec = rows.numeric_as_f64(&catalog.key_dec)?;
            for (r, d) in ra.iter().zip(&dec).take(20) {
                println!("  RA {r:.6}°  Dec {d:+.6}°");
            }
        }
        None => println!("no catalog shard overlaps the tile"),
    }
    Ok(())
}
