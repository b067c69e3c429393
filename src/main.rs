use dreq::error::AppResult;

fn main() -> AppResult<()> {
    dreq::entry::run()
}
