use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    feature_indexing::cli::run_feature_indexing(std::env::args().skip(1))
}
