fn main() {
    clearcut_clusters::cli::run();
}
