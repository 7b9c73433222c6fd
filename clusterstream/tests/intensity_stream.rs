//! Raw intensity and noise routing from CIF/CNF shards.

mod common;

use clusterstream::provider::ProviderFactory;
use clusterstream::{DataType, FileFormat};
use common::RunBuilder;

#[test]
fn intensities_and_noise_fill_their_slots() {
    let run = RunBuilder::new(1);
    run.bcl(1101, 1, &[0xA1, 0xA2]);
    run.bcl(1101, 2, &[0xA2, 0xA3]);
    run.filter(1101, &[1, 1]);
    run.locs(1101, &[(0.0, 0.0), (1.0, 1.0)]);
    // channel-major per cycle: A A C C G G T T over two clusters
    run.intensities(1101, 1, "cif", &[10, 11, 20, 21, 30, 31, 40, 41]);
    run.intensities(1101, 2, "cif", &[50, 51, 60, 61, 70, 71, 80, 81]);
    run.intensities(1101, 1, "cnf", &[-1, -2, -3, -4, -5, -6, -7, -8]);
    run.intensities(1101, 2, "cnf", &[1, 2, 3, 4, 5, 6, 7, 8]);

    let factory = ProviderFactory::new(
        &run.basecall_dir(),
        1,
        "2T".parse().unwrap(),
        &[
            DataType::BaseCalls,
            DataType::RawIntensities,
            DataType::Noise,
        ],
    )
    .unwrap();
    assert_eq!(
        factory.format_for(DataType::RawIntensities),
        Some(FileFormat::Cif)
    );
    assert_eq!(factory.format_for(DataType::Noise), Some(FileFormat::Cnf));

    let clusters: Vec<_> = factory
        .make_provider()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(clusters.len(), 2);

    let read = &clusters[0].reads[0];
    let intensities = read.intensities.as_ref().unwrap();
    // channel A across the read's two cycles, first cluster
    assert_eq!(intensities.channel(0), &[10, 50]);
    assert_eq!(intensities.channel(3), &[40, 80]);
    let noise = read.noise.as_ref().unwrap();
    assert_eq!(noise.channel(0), &[-1, 1]);

    let read = &clusters[1].reads[0];
    let intensities = read.intensities.as_ref().unwrap();
    assert_eq!(intensities.channel(0), &[11, 51]);
    let noise = read.noise.as_ref().unwrap();
    assert_eq!(noise.channel(3), &[-8, 8]);
}

#[test]
fn intensity_only_requests_skip_position() {
    let run = RunBuilder::new(1);
    run.intensities(1101, 1, "cif", &[1, 2, 3, 4]);

    let factory = ProviderFactory::new(
        &run.basecall_dir(),
        1,
        "1T".parse().unwrap(),
        &[DataType::RawIntensities],
    )
    .unwrap();
    assert_eq!(factory.format_for(DataType::Position), None);

    let clusters: Vec<_> = factory
        .make_provider()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].x, -1);
    let intensities = clusters[0].reads[0].intensities.as_ref().unwrap();
    assert_eq!(intensities.channel(0), &[1]);
    assert_eq!(intensities.channel(2), &[3]);
}
