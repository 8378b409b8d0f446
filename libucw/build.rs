fn main() {
    println!("cargo:rerun-if-changed=csrc/list.c");

    cc::Build::new()
        .file("csrc/list.c")
        .flag_if_supported("-fvisibility=hidden")
        .warnings(true)
        .compile("ucw_list");
}
