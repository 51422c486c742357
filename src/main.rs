use std::io;
use std::time::Instant;

use mzchrom::peak_picker::PeakDetector;
use mzchrom::smooth::SmoothingMethod;
use mzchrom::test_data::noisy_gaussian_series;

fn main() -> io::Result<()> {
    let series = noisy_gaussian_series(
        2000,
        &[
            (300.0, 8.0, 5000.0),
            (700.0, 8.0, 2500.0),
            (1200.0, 15.0, 800.0),
            (1600.0, 5.0, 300.0),
        ],
        100.0,
        10.0,
        42,
    );

    let detector = PeakDetector::default();
    let start = Instant::now();
    match detector.detect(&series) {
        Ok(peaks) => {
            println!(
                "Found {} peaks in {} microseconds",
                peaks.len(),
                (Instant::now() - start).as_micros()
            );
            for peak in peaks.iter() {
                println!("\t{}", peak);
            }
        }
        Err(err) => println!("Encountered error {:?}", err),
    };

    let detector = PeakDetector::builder()
        .smoothing(SmoothingMethod::SavitzkyGolay, 2)
        .build();
    let start = Instant::now();
    match detector.detect(&series) {
        Ok(peaks) => {
            println!(
                "Found {} peaks after Savitzky-Golay smoothing in {} microseconds",
                peaks.len(),
                (Instant::now() - start).as_micros()
            );
            for peak in peaks.iter() {
                println!("\t{}", peak);
            }
        }
        Err(err) => println!("Encountered error {:?}", err),
    };

    match detector.detect_in_time_range(&series, 55.0, 65.0) {
        Ok(peaks) => {
            println!("Found {} peaks between 55 and 65", peaks.len());
            for peak in peaks.iter() {
                println!("\t{}", peak);
            }
        }
        Err(err) => println!("Encountered error {:?}", err),
    };
    Ok(())
}
