fn main() -> anyhow::Result<()> {
  mixbot_remote_lib::run()
}
